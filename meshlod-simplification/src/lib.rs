//! Progressive mesh LOD generation
//!
//! This crate turns a triangle mesh into an ordered sequence of
//! lower-detail levels using greedy edge collapse:
//! - a position-unified vertex/edge/triangle graph
//! - pluggable collapse cost calculators (curvature base plus
//!   outside-weighting and profile/boundary decorators)
//! - an outside-silhouette marker over a convex hull proxy
//! - a priority-driven collapser with deterministic tie-breaks
//! - an orchestrator baking per-level index buffers

pub mod graph;
pub mod cost;
pub mod outside;
pub mod collapse;
pub mod generator;

pub use graph::*;
pub use cost::*;
pub use outside::*;
pub use collapse::*;
pub use generator::*;
