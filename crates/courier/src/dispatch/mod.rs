//! Bounded execution of requests and the manager that creates them.

mod manager;
mod queue;

pub use manager::{DispatchManager, RequestDefaults};
pub use queue::ExecutionQueue;
