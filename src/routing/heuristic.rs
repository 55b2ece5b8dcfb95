//! Model-name heuristics for routing models no endpoint declares.

use super::endpoint::Endpoint;

/// Picks an endpoint for a model that no endpoint lists explicitly.
///
/// Results are cached per model by the [`Router`](super::Router), so
/// implementations should be deterministic for a given candidate list.
pub trait RouteHeuristic: Send + Sync {
    /// Position in `candidates` of the chosen endpoint.
    fn choose(&self, model: &str, candidates: &[&Endpoint]) -> Option<usize>;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> RouteHeuristic for F
where
    F: Fn(&str, &[&Endpoint]) -> Option<usize> + Send + Sync,
{
    fn choose(&self, model: &str, candidates: &[&Endpoint]) -> Option<usize> {
        self(model, candidates)
    }
}

const BUILTIN_FAMILIES: &[(&str, &str)] = &[
    ("gpt-", "openai"),
    ("chatgpt", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("o4", "openai"),
    ("text-embedding", "openai"),
    ("claude", "anthropic"),
    ("gemini", "gemini"),
    ("gemma", "gemini"),
    ("grok", "xai"),
    ("deepseek", "deepseek"),
    ("mistral", "mistral"),
    ("codestral", "mistral"),
    ("llama", "ollama"),
    ("qwen", "ollama"),
    ("phi", "ollama"),
];

/// Infers the provider from well-known model name prefixes.
///
/// A `provider/model` identifier routes straight to the endpoint with that
/// name. Otherwise the first matching prefix names a provider, which is
/// matched against endpoint names and then dialect names.
#[derive(Debug, Clone)]
pub struct ModelFamilyHeuristic {
    families: Vec<(String, String)>,
}

impl Default for ModelFamilyHeuristic {
    fn default() -> Self {
        Self {
            families: BUILTIN_FAMILIES
                .iter()
                .map(|(prefix, provider)| (prefix.to_string(), provider.to_string()))
                .collect(),
        }
    }
}

impl ModelFamilyHeuristic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix rule. Custom rules are checked before the built-in ones.
    pub fn with_family(mut self, prefix: impl Into<String>, provider: impl Into<String>) -> Self {
        self.families
            .insert(0, (prefix.into().to_lowercase(), provider.into().to_lowercase()));
        self
    }

    /// Provider name inferred for `model`, if any.
    pub fn provider_for(&self, model: &str) -> Option<&str> {
        let model = model.to_lowercase();
        let bare = model.rsplit('/').next().unwrap_or(model.as_str());
        self.families
            .iter()
            .find(|(prefix, _)| bare.starts_with(prefix.as_str()))
            .map(|(_, provider)| provider.as_str())
    }
}

impl RouteHeuristic for ModelFamilyHeuristic {
    fn choose(&self, model: &str, candidates: &[&Endpoint]) -> Option<usize> {
        if let Some((prefix, _)) = model.split_once('/')
            && let Some(pos) = candidates
                .iter()
                .position(|e| e.name.eq_ignore_ascii_case(prefix))
        {
            return Some(pos);
        }

        let provider = self.provider_for(model)?;
        candidates
            .iter()
            .position(|e| e.name.to_lowercase().contains(provider))
            .or_else(|| {
                candidates
                    .iter()
                    .position(|e| e.dialect.name() == provider)
            })
    }

    fn name(&self) -> &str {
        "model_family"
    }
}
