//! Default Configuration Values
//!
//! This module centralizes all default values used throughout the engine.
//! Having defaults in one place makes them easier to maintain, document, and adjust.

use std::time::Duration;

/// HTTP client default configurations
pub mod http {
    use super::*;

    /// Default request timeout for HTTP requests
    ///
    /// Set to 60 seconds to accommodate large language models that may take
    /// 10-20 seconds to respond, plus network latency and proxy delays.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default connection timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default User-Agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("siumai-engine/", env!("CARGO_PKG_VERSION"));

    /// Default maximum number of idle connections per host
    pub const MAX_IDLE_PER_HOST: usize = 10;
}

/// Retry defaults
pub mod retry {
    use super::*;

    /// Retries after the first attempt (so at most `MAX_RETRIES + 1` attempts).
    pub const MAX_RETRIES: u32 = 3;

    pub const INITIAL_DELAY: Duration = Duration::from_millis(500);

    /// Ceiling for any computed or server-suggested delay.
    pub const MAX_DELAY: Duration = Duration::from_secs(30);

    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Symmetric jitter band (0.25 = ±25%).
    pub const JITTER_FACTOR: f64 = 0.25;
}

/// Streaming defaults
pub mod streaming {
    /// Reserved payload that terminates an event stream.
    pub const DONE_SENTINEL: &str = "[DONE]";

    /// SSE field prefix carrying event payloads.
    pub const SSE_DATA_PREFIX: &str = "data:";
}

/// Routing defaults
pub mod routing {
    /// Maximum number of cached heuristic routing decisions.
    pub const DECISION_CACHE_CAPACITY: usize = 256;
}
