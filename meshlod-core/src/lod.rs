//! Generated LOD output data and collapse cost sentinels

use serde::{Deserialize, Serialize};

/// Cost of an edge that must never be collapsed
///
/// Kept below [`UNINITIALIZED_COLLAPSE_COST`] so an initialized heap can
/// still order never-collapse entries last.
pub const NEVER_COLLAPSE_COST: f32 = f32::MAX;

/// Cost of an edge whose cost has not been computed yet
///
/// This value marks missing initialization only. It must never reach a
/// cost comparison; the collapser drops vertices without live edges from
/// the heap instead.
pub const UNINITIALIZED_COLLAPSE_COST: f32 = f32::INFINITY;

/// One recorded edge collapse, in graph index space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseRecord {
    /// Graph id of the vertex that was merged away
    pub src: u32,
    /// Graph id of the vertex it was merged into
    pub dst: u32,
    /// Graph ids of the triangles destroyed by this collapse
    pub removed_triangles: Vec<u32>,
}

/// A single generated LOD level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodLevel {
    /// Reduced index buffer per submesh, addressing the caller's original
    /// vertex buffers
    pub indices: Vec<Vec<u32>>,
    /// Every collapse applied from the original mesh up to this level
    pub collapse_log: Vec<CollapseRecord>,
    /// Unique (position-unified) vertices remaining at this level
    pub unique_vertex_count: usize,
    /// Triangles remaining at this level
    pub triangle_count: usize,
    /// True when the target was already met and this level removed nothing
    pub skipped: bool,
}

/// Ordered sequence of generated levels, least reduced first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedLods {
    pub levels: Vec<LodLevel>,
}

impl LodLevel {
    /// Total number of indices across all submeshes
    pub fn index_count(&self) -> usize {
        self.indices.iter().map(|b| b.len()).sum()
    }
}

impl GeneratedLods {
    /// Get the number of generated levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Check whether any level was generated
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
