//! Background work queue for LOD generation
//!
//! Submitting a [`LodRequest`] hands the mesh to a pool of worker threads
//! and returns a [`LodHandle`] for the caller to poll, wait on or attach a
//! completion callback to. Requests sharing a tag run one at a time in
//! submission order, so several versions of the same asset never race;
//! requests with different tags run in parallel across the pool.
//!
//! # Example
//!
//! ```
//! use meshlod_core::{LodConfig, MeshBuffers, Point3f, SubmeshBuffers};
//! use meshlod_queue::{LodRequest, LodWorkQueue};
//!
//! let positions = vec![
//!     Point3f::new(0.0, 0.0, 0.0),
//!     Point3f::new(1.0, 0.0, 0.0),
//!     Point3f::new(0.5, 1.0, 0.0),
//!     Point3f::new(0.5, 0.5, 1.0),
//! ];
//! let indices = vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3];
//! let mesh = MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(positions, indices)]);
//!
//! let queue = LodWorkQueue::start(2)?;
//! let handle = queue.submit(LodRequest::new(mesh, LodConfig::default(), "rock"))?;
//! let lods = handle.wait()?;
//! assert_eq!(lods.level_count(), 3);
//! # Ok::<(), meshlod_core::Error>(())
//! ```

pub mod handle;
pub mod queue;

pub use handle::*;
pub use queue::*;
