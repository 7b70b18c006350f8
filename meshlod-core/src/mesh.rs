//! Input mesh buffers for LOD generation

use crate::point::*;
use serde::{Deserialize, Serialize};

/// Vertex and index buffers for one submesh
///
/// Indices address this submesh's own position buffer. Normals are
/// optional; when present they must be parallel to `positions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmeshBuffers {
    pub positions: Vec<Point3f>,
    pub normals: Option<Vec<Vector3f>>,
    pub indices: Vec<u32>,
}

/// A triangle mesh presented to the LOD generator as raw buffers
///
/// The bounding sphere radius scales the position-unification grid, so it
/// must describe the mesh as a whole rather than a single submesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshBuffers {
    pub submeshes: Vec<SubmeshBuffers>,
    pub bounding_sphere_radius: f32,
}

impl SubmeshBuffers {
    /// Create a submesh from positions and triangle indices
    pub fn new(positions: Vec<Point3f>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals: None,
            indices,
        }
    }

    /// Create a submesh carrying per-vertex normals
    pub fn with_normals(
        positions: Vec<Point3f>,
        normals: Vec<Vector3f>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            positions,
            normals: Some(normals),
            indices,
        }
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl MeshBuffers {
    /// Create an empty mesh with a known bounding sphere radius
    pub fn new(bounding_sphere_radius: f32) -> Self {
        Self {
            submeshes: Vec::new(),
            bounding_sphere_radius,
        }
    }

    /// Create a mesh from submeshes, computing the bounding sphere radius
    pub fn from_submeshes(submeshes: Vec<SubmeshBuffers>) -> Self {
        let mut mesh = Self {
            submeshes,
            bounding_sphere_radius: 0.0,
        };
        mesh.bounding_sphere_radius = mesh.computed_bounding_sphere_radius();
        mesh
    }

    /// Add a submesh to the mesh
    pub fn add_submesh(&mut self, submesh: SubmeshBuffers) {
        self.submeshes.push(submesh);
    }

    /// Get the total number of buffer vertices across submeshes
    pub fn vertex_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.positions.len()).sum()
    }

    /// Get the total number of triangles across submeshes
    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.triangle_count()).sum()
    }

    /// Check if the mesh has no geometry
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0 || self.triangle_count() == 0
    }

    /// Radius of a bounding sphere centered on the position centroid
    pub fn computed_bounding_sphere_radius(&self) -> f32 {
        let count = self.vertex_count();
        if count == 0 {
            return 0.0;
        }
        let mut centroid = Vector3f::zeros();
        for submesh in &self.submeshes {
            for p in &submesh.positions {
                centroid += p.coords;
            }
        }
        centroid /= count as f32;
        let mut radius: f32 = 0.0;
        for submesh in &self.submeshes {
            for p in &submesh.positions {
                radius = radius.max((p.coords - centroid).norm());
            }
        }
        radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts() {
        let mut mesh = MeshBuffers::new(1.0);
        mesh.add_submesh(SubmeshBuffers::new(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2],
        ));
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = MeshBuffers::new(1.0);
        assert!(mesh.is_empty());
        assert_eq!(mesh.computed_bounding_sphere_radius(), 0.0);
    }

    #[test]
    fn test_computed_radius() {
        let mesh = MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
            vec![Point3f::new(-2.0, 0.0, 0.0), Point3f::new(2.0, 0.0, 0.0)],
            vec![],
        )]);
        assert_relative_eq!(mesh.bounding_sphere_radius, 2.0, epsilon = 1e-6);
    }
}
