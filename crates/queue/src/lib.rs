pub mod bus;
pub mod tasks;

pub use bus::{EventSubscriber, RealtimeBus};
pub use tasks::{ClaimedBatch, LeasedTask, TaskQueue};
