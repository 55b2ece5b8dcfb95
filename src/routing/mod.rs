//! Endpoint routing
//!
//! Chooses the upstream endpoint for a model identifier. Independent of the
//! transport and streaming stack; the client consults it once per request.

mod endpoint;
mod heuristic;
mod router;

pub use endpoint::{Endpoint, RouteTable};
pub use heuristic::{ModelFamilyHeuristic, RouteHeuristic};
pub use router::{FallbackPolicy, Router, route};
