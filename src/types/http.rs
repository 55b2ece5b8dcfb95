//! HTTP configuration types.
//!
//! This module defines `HttpConfig` and its builder, used to configure the
//! reqwest client behind the default transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::LlmError;
use crate::utils::duration_serde::option_millis;

/// HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout (milliseconds on the wire)
    #[serde(with = "option_millis")]
    pub timeout: Option<Duration>,
    /// Connection timeout (milliseconds on the wire)
    #[serde(with = "option_millis")]
    pub connect_timeout: Option<Duration>,
    /// Headers added to every request
    pub headers: HashMap<String, String>,
    /// Proxy settings
    pub proxy: Option<String>,
    /// User agent
    pub user_agent: Option<String>,
    /// Whether to disable compression for streaming (SSE) requests.
    ///
    /// When `true`, streaming requests explicitly set `Accept-Encoding: identity`
    /// to avoid intermediary/proxy compression which can break long-lived SSE
    /// connections.
    pub stream_disable_compression: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Some(crate::defaults::http::REQUEST_TIMEOUT),
            connect_timeout: Some(crate::defaults::http::CONNECT_TIMEOUT),
            headers: HashMap::new(),
            proxy: None,
            user_agent: Some(crate::defaults::http::USER_AGENT.to_string()),
            stream_disable_compression: true,
        }
    }
}

impl HttpConfig {
    /// Returns a builder for constructing `HttpConfig`
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::new()
    }

    /// Build a reqwest client honoring this configuration.
    pub fn build_client(&self) -> Result<reqwest::Client, LlmError> {
        let mut builder =
            reqwest::Client::builder().pool_max_idle_per_host(crate::defaults::http::MAX_IDLE_PER_HOST);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| LlmError::ConfigurationError(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("Failed to build HTTP client: {e}")))
    }
}

/// Builder for `HttpConfig` to construct configuration in a unified and safe way
#[derive(Debug, Clone, Default)]
pub struct HttpConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    headers: HashMap<String, String>,
    proxy: Option<String>,
    user_agent: Option<String>,
    stream_disable_compression: Option<bool>,
}

impl HttpConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
    pub fn user_agent<S: Into<String>>(mut self, user_agent: Option<S>) -> Self {
        self.user_agent = user_agent.map(|s| s.into());
        self
    }
    pub fn proxy<S: Into<String>>(mut self, proxy: Option<S>) -> Self {
        self.proxy = proxy.map(|s| s.into());
        self
    }
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
    pub fn stream_disable_compression(mut self, val: bool) -> Self {
        self.stream_disable_compression = Some(val);
        self
    }

    /// Build the configuration
    pub fn build(self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            timeout: self.timeout.or(defaults.timeout),
            connect_timeout: self.connect_timeout.or(defaults.connect_timeout),
            headers: self.headers,
            proxy: self.proxy,
            user_agent: self.user_agent.or(defaults.user_agent),
            stream_disable_compression: self
                .stream_disable_compression
                .unwrap_or(defaults.stream_disable_compression),
        }
    }
}
