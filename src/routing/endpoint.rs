//! Upstream endpoints and the ordered table they live in.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::LlmError;
use crate::streaming::Dialect;

/// One upstream API the engine can send requests to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique name, also used by heuristics (e.g. "openai", "anthropic").
    pub name: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub dialect: Dialect,
    /// Models this endpoint serves. Empty means any model.
    #[serde(default)]
    pub models: Vec<String>,
    /// Extra headers (typically auth) sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Overrides the dialect's request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            dialect,
            models: Vec::new(),
            headers: HashMap::new(),
            path: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models.extend(models.into_iter().map(Into::into));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// True when no model list is declared.
    pub fn accepts_any(&self) -> bool {
        self.models.is_empty()
    }

    /// Exact membership in the declared model list.
    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Full request URL for `model`.
    pub fn url(&self, model: &str, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.path {
            Some(path) if path.starts_with('/') => format!("{base}{path}"),
            Some(path) => format!("{base}/{path}"),
            None => format!("{base}{}", self.dialect.path(model, stream)),
        }
    }
}

/// Ordered endpoints. Immutable once handed to a [`Router`](super::Router).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    endpoints: Vec<Endpoint>,
}

impl RouteTable {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Names must be unique and base URLs must be http(s).
    pub fn validate(&self) -> Result<(), LlmError> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() {
                return Err(LlmError::ConfigurationError(
                    "endpoint name must not be empty".to_string(),
                ));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(LlmError::ConfigurationError(format!(
                    "duplicate endpoint name `{}`",
                    endpoint.name
                )));
            }
            let url = endpoint.base_url.as_str();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(LlmError::ConfigurationError(format!(
                    "endpoint `{}` has invalid base URL `{url}`",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<Endpoint>> for RouteTable {
    fn from(endpoints: Vec<Endpoint>) -> Self {
        Self::new(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_dialect_path_unless_overridden() {
        let openai = Endpoint::new("openai", "https://api.openai.com/v1/", Dialect::OpenAi);
        assert_eq!(
            openai.url("gpt-4o", true),
            "https://api.openai.com/v1/chat/completions"
        );

        let gemini = Endpoint::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta",
            Dialect::Gemini,
        );
        assert_eq!(
            gemini.url("gemini-2.0-flash", true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );

        let custom = openai.clone().with_path("v2/chat");
        assert_eq!(custom.url("x", true), "https://api.openai.com/v1/v2/chat");
    }

    #[test]
    fn validate_rejects_duplicates_and_bad_urls() {
        let table = RouteTable::default()
            .with_endpoint(Endpoint::new("a", "http://localhost:1", Dialect::OpenAi))
            .with_endpoint(Endpoint::new("a", "http://localhost:2", Dialect::OpenAi));
        assert!(matches!(
            table.validate(),
            Err(LlmError::ConfigurationError(msg)) if msg.contains("duplicate")
        ));

        let table = RouteTable::new(vec![Endpoint::new("b", "ftp://x", Dialect::Ollama)]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn endpoint_deserializes_with_defaults() {
        let endpoint: Endpoint = serde_json::from_str(
            r#"{"name": "local", "base_url": "http://localhost:11434", "dialect": "ollama"}"#,
        )
        .unwrap();
        assert!(endpoint.accepts_any());
        assert_eq!(endpoint.url("llama3", true), "http://localhost:11434/api/chat");
    }
}
