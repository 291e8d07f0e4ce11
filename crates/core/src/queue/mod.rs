//! Bounded-concurrency cycle scheduler.
//!
//! Every cycle drains the four work classes concurrently against a
//! [`WorkProvider`], sharing one pool of `max_concurrent` slots.

mod config;
mod manager;
mod types;

pub use config::QueueConfig;
pub use manager::{QueueManager, WorkProvider};
pub use types::{QueueStatus, WorkClass};
