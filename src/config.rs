//! Engine configuration
//!
//! Everything needed to build a [`StreamingClient`](crate::client::StreamingClient),
//! loadable from JSON. Every section is optional and falls back to
//! [`defaults`](crate::defaults).
//!
//! ```json
//! {
//!   "http": { "timeout": 60000, "stream_disable_compression": true },
//!   "retry": { "max_retries": 3, "initial_delay": 500, "max_delay": 30000 },
//!   "endpoints": [
//!     { "name": "openai", "base_url": "https://api.openai.com/v1", "dialect": "openai" }
//!   ],
//!   "fallback": "fail"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::LlmError;
use crate::retry::RetryPolicy;
use crate::routing::{Endpoint, FallbackPolicy, RouteTable, Router};
use crate::types::HttpConfig;

fn default_cache_capacity() -> usize {
    defaults::routing::DECISION_CACHE_CAPACITY
}

fn default_reasoning() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    /// Capacity of the heuristic routing decision cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Emit reasoning chunks while decoding.
    #[serde(default = "default_reasoning")]
    pub reasoning: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            retry: RetryPolicy::default(),
            endpoints: Vec::new(),
            fallback: FallbackPolicy::default(),
            cache_capacity: default_cache_capacity(),
            reasoning: default_reasoning(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, LlmError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        self.retry.validate()?;
        if self.endpoints.is_empty() {
            return Err(LlmError::ConfigurationError(
                "at least one endpoint is required".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(LlmError::ConfigurationError(
                "cache_capacity must be greater than zero".to_string(),
            ));
        }
        self.route_table().validate()
    }

    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(self.endpoints.clone())
    }

    pub fn build_router(&self) -> Router {
        Router::new(self.route_table())
            .with_fallback(self.fallback.clone())
            .with_cache_capacity(self.cache_capacity)
    }
}
