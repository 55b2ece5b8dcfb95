//! Model → endpoint routing.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::endpoint::{Endpoint, RouteTable};
use super::heuristic::{ModelFamilyHeuristic, RouteHeuristic};
use crate::defaults::routing::DECISION_CACHE_CAPACITY;
use crate::error::LlmError;

/// What to do when no endpoint declares the requested model.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Refuse with a routing error.
    #[default]
    Fail,
    /// The first candidate.
    FirstAvailable,
    /// Rotate across candidates.
    RoundRobin,
    /// Built-in [`ModelFamilyHeuristic`].
    ModelFamily,
    /// Caller-supplied heuristic.
    #[serde(skip)]
    Heuristic(Arc<dyn RouteHeuristic>),
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => f.write_str("Fail"),
            Self::FirstAvailable => f.write_str("FirstAvailable"),
            Self::RoundRobin => f.write_str("RoundRobin"),
            Self::ModelFamily => f.write_str("ModelFamily"),
            Self::Heuristic(h) => f.debug_tuple("Heuristic").field(&h.name()).finish(),
        }
    }
}

impl FallbackPolicy {
    pub fn heuristic(heuristic: impl RouteHeuristic + 'static) -> Self {
        Self::Heuristic(Arc::new(heuristic))
    }
}

/// Picks an endpoint per model.
///
/// The table is read-only; the only shared mutable state is the heuristic
/// decision cache and the round-robin cursor, so one router can serve
/// concurrent requests.
pub struct Router {
    table: RouteTable,
    fallback: FallbackPolicy,
    family: ModelFamilyHeuristic,
    /// model → index into `table`, or `None` when the heuristic declined.
    decisions: Mutex<LruCache<String, Option<usize>>>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("table", &self.table)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Router {
    pub fn new(table: impl Into<RouteTable>) -> Self {
        Self {
            table: table.into(),
            fallback: FallbackPolicy::default(),
            family: ModelFamilyHeuristic::default(),
            decisions: Mutex::new(LruCache::new(cache_capacity(DECISION_CACHE_CAPACITY))),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.decisions = Mutex::new(LruCache::new(cache_capacity(capacity)));
        self
    }

    pub fn with_model_families(mut self, family: ModelFamilyHeuristic) -> Self {
        self.family = family;
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn fallback(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Number of cached heuristic decisions.
    pub fn cached_decisions(&self) -> usize {
        self.lock_decisions().len()
    }

    /// Endpoint for `model`.
    ///
    /// A single configured endpoint serves every model. Otherwise the first
    /// endpoint declaring the model wins, and the fallback policy decides
    /// among the candidates: endpoints accepting any model, or all endpoints
    /// when none do.
    pub fn route(&self, model: &str) -> Result<&Endpoint, LlmError> {
        let endpoints = self.table.endpoints();
        match endpoints {
            [] => {
                return Err(LlmError::RoutingError(
                    "no endpoints configured".to_string(),
                ));
            }
            [only] => return Ok(only),
            _ => {}
        }

        if let Some(endpoint) = endpoints.iter().find(|e| e.supports(model)) {
            tracing::debug!(model, endpoint = %endpoint.name, "routed by exact model match");
            return Ok(endpoint);
        }

        let mut candidates: Vec<usize> = endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| e.accepts_any())
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            candidates = (0..endpoints.len()).collect();
        }

        let chosen = match &self.fallback {
            FallbackPolicy::Fail => None,
            FallbackPolicy::FirstAvailable => candidates.first().copied(),
            FallbackPolicy::RoundRobin => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                Some(candidates[turn % candidates.len()])
            }
            FallbackPolicy::ModelFamily => self.decide(model, &self.family, &candidates),
            FallbackPolicy::Heuristic(h) => self.decide(model, h.as_ref(), &candidates),
        };

        match chosen {
            Some(index) => {
                let endpoint = &endpoints[index];
                tracing::debug!(
                    model,
                    endpoint = %endpoint.name,
                    fallback = ?self.fallback,
                    "routed by fallback policy"
                );
                Ok(endpoint)
            }
            None => Err(LlmError::RoutingError(format!(
                "no endpoint serves model `{model}` ({} configured, fallback {:?})",
                endpoints.len(),
                self.fallback
            ))),
        }
    }

    fn decide(
        &self,
        model: &str,
        heuristic: &dyn RouteHeuristic,
        candidates: &[usize],
    ) -> Option<usize> {
        if let Some(cached) = self.lock_decisions().get(model) {
            return *cached;
        }

        let endpoints = self.table.endpoints();
        let refs: Vec<&Endpoint> = candidates.iter().map(|&i| &endpoints[i]).collect();
        let decision = heuristic
            .choose(model, &refs)
            .and_then(|pos| candidates.get(pos).copied());
        tracing::debug!(
            model,
            heuristic = heuristic.name(),
            endpoint = decision.map(|i| endpoints[i].name.as_str()),
            "heuristic routing decision"
        );
        self.lock_decisions().put(model.to_string(), decision);
        decision
    }

    fn lock_decisions(&self) -> std::sync::MutexGuard<'_, LruCache<String, Option<usize>>> {
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

/// Route with the default (failing) fallback policy.
pub fn route<'a>(model: &str, endpoints: &'a [Endpoint]) -> Result<&'a Endpoint, LlmError> {
    match endpoints {
        [] => Err(LlmError::RoutingError("no endpoints configured".to_string())),
        [only] => Ok(only),
        _ => endpoints
            .iter()
            .find(|e| e.supports(model))
            .ok_or_else(|| {
                LlmError::RoutingError(format!(
                    "no endpoint serves model `{model}` ({} configured)",
                    endpoints.len()
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::Dialect;
    use std::sync::atomic::AtomicU32;

    fn openai() -> Endpoint {
        Endpoint::new("openai", "https://api.openai.com/v1", Dialect::OpenAi)
            .with_models(["gpt-4o", "gpt-4o-mini"])
    }

    fn anthropic() -> Endpoint {
        Endpoint::new("anthropic", "https://api.anthropic.com/v1", Dialect::Anthropic)
            .with_model("claude-sonnet-4")
    }

    #[test]
    fn single_endpoint_serves_any_model() {
        let router = Router::new(vec![openai()]);
        assert_eq!(router.route("not-a-real-model").unwrap().name, "openai");
        assert_eq!(route("whatever", &[anthropic()]).unwrap().name, "anthropic");
    }

    #[test]
    fn no_match_with_default_policy_is_a_routing_error() {
        let router = Router::new(vec![openai(), anthropic()]);
        let err = router.route("mystery-model").unwrap_err();
        assert!(matches!(err, LlmError::RoutingError(msg) if msg.contains("mystery-model")));
        assert!(route("mystery-model", &[openai(), anthropic()]).is_err());
    }

    #[test]
    fn exact_match_picks_first_declaring_endpoint() {
        let mirror = Endpoint {
            name: "mirror".into(),
            ..openai()
        };
        let router = Router::new(vec![anthropic(), openai(), mirror]);
        assert_eq!(router.route("gpt-4o").unwrap().name, "openai");
        assert_eq!(router.route("claude-sonnet-4").unwrap().name, "anthropic");
    }

    #[test]
    fn first_available_prefers_accept_any_endpoints() {
        let any = Endpoint::new("gateway", "http://localhost:8080/v1", Dialect::OpenAi);
        let router = Router::new(vec![openai(), anthropic(), any])
            .with_fallback(FallbackPolicy::FirstAvailable);
        assert_eq!(router.route("mixtral").unwrap().name, "gateway");

        let router = Router::new(vec![anthropic(), openai()])
            .with_fallback(FallbackPolicy::FirstAvailable);
        assert_eq!(router.route("mixtral").unwrap().name, "anthropic");
    }

    #[test]
    fn round_robin_rotates_across_candidates() {
        let router =
            Router::new(vec![openai(), anthropic()]).with_fallback(FallbackPolicy::RoundRobin);
        let names: Vec<&str> = (0..4)
            .map(|_| router.route("unknown").unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["openai", "anthropic", "openai", "anthropic"]);
    }

    #[test]
    fn heuristic_decisions_are_cached_per_model() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let heuristic = move |_model: &str, candidates: &[&Endpoint]| -> Option<usize> {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(candidates.len() - 1)
        };
        let router = Router::new(vec![openai(), anthropic()])
            .with_fallback(FallbackPolicy::heuristic(heuristic))
            .with_cache_capacity(2);

        for _ in 0..3 {
            assert_eq!(router.route("m1").unwrap().name, "anthropic");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        router.route("m2").unwrap();
        router.route("m3").unwrap();
        assert_eq!(router.cached_decisions(), 2);
        // m1 was evicted.
        router.route("m1").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn model_family_fallback_and_negative_caching() {
        let router = Router::new(vec![openai(), anthropic()])
            .with_fallback(FallbackPolicy::ModelFamily);
        assert_eq!(router.route("claude-opus-4").unwrap().name, "anthropic");
        assert_eq!(router.route("gpt-5").unwrap().name, "openai");
        assert!(router.route("gemini-2.5-pro").is_err());
        assert_eq!(router.cached_decisions(), 3);
    }

    #[test]
    fn concurrent_routing_shares_one_cache() {
        let router = Router::new(vec![openai(), anthropic()])
            .with_fallback(FallbackPolicy::ModelFamily);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(router.route("claude-haiku").unwrap().name, "anthropic");
                    }
                });
            }
        });
        assert_eq!(router.cached_decisions(), 1);
    }

    #[test]
    fn fallback_policy_deserializes_from_snake_case() {
        let policy: FallbackPolicy = serde_json::from_str("\"round_robin\"").unwrap();
        assert!(matches!(policy, FallbackPolicy::RoundRobin));
        let policy: FallbackPolicy = serde_json::from_str("\"model_family\"").unwrap();
        assert!(matches!(policy, FallbackPolicy::ModelFamily));
    }
}
