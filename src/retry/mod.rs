//! Retry Mechanism Module
//!
//! Backoff policy, server retry hints and the per-request state machine used
//! by the resilient transport.

pub mod policy;
pub mod retry_after;
pub mod state;

pub use policy::RetryPolicy;
pub use retry_after::{parse_retry_after, parse_retry_after_value};
pub use state::{RetryDecision, RetryPhase, RetryState};
