//! Per-order transform engine.
//!
//! Every entry point returns a [`TransformHandle`] right after its fetch step;
//! the rest of the state machine runs in the background.

mod config;
mod error;
mod handle;
mod runner;

pub use config::EngineConfig;
pub use error::TransformError;
pub use handle::{TransformHandle, TransformProgress, TransformStep};
pub use runner::TransformEngine;
