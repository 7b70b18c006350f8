//! Core data structures and error types for meshlod
//!
//! This crate provides the shared vocabulary for the LOD generation
//! pipeline: input mesh buffers, generation configuration, output levels
//! with their collapse logs, cost sentinels, cooperative cancellation,
//! and the error taxonomy.

pub mod point;
pub mod mesh;
pub mod config;
pub mod lod;
pub mod cancel;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use config::*;
pub use lod::*;
pub use cancel::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
