//! Utility modules shared across the engine.

pub mod cancel;
pub mod duration_serde;

pub use cancel::{CancelHandle, make_cancellable_stream};
