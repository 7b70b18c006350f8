//! Vertex/edge/triangle graph built from raw mesh buffers
//!
//! Buffer vertices are unified by position on an integer grid stretched to
//! the mesh bounding sphere, so unification tolerance scales with mesh
//! size. Triangles keep their original per-corner buffer indices, which is
//! what lets baked LOD levels keep referencing the caller's unmodified
//! vertex buffers.

use meshlod_core::{
    Error, MeshBuffers, Point3f, Result, SubmeshBuffers, Vector3f, UNINITIALIZED_COLLAPSE_COST,
};
use std::collections::HashMap;

/// Dense arena index of a graph vertex
///
/// Ids are assigned in discovery order at build time and double as the
/// deterministic tie-break for equal collapse costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub u32);

/// Dense arena index of a graph triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriangleId(pub u32);

impl VertexId {
    /// Position in the vertex arena
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TriangleId {
    /// Position in the triangle arena
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Directed edge from its owning vertex to `dst`
///
/// Duplicate directed edges collapse into one entry; `ref_count` tracks how
/// many live triangles still reference it. Identity is `dst` alone.
#[derive(Debug, Clone)]
pub struct Edge {
    pub dst: VertexId,
    /// Stays at the uninitialized sentinel until a calculator fills it
    pub collapse_cost: f32,
    pub ref_count: u32,
}

/// Graph vertex, one per unique position
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3f,
    /// Accumulated unit normal; meaningful only when the graph has normals
    pub normal: Vector3f,
    /// True when more than one buffer slot maps to this position
    pub seam: bool,
    pub edges: Vec<Edge>,
    pub triangles: Vec<TriangleId>,
    /// Destination of the cheapest outgoing edge, maintained by the collapser
    pub collapse_target: Option<VertexId>,
}

/// Graph triangle with its original buffer corners
#[derive(Debug, Clone)]
pub struct Triangle {
    pub vertices: [VertexId; 3],
    /// Per-corner index into the owning submesh's original vertex buffer
    pub corner_indices: [u32; 3],
    pub submesh: u16,
    pub normal: Vector3f,
    pub removed: bool,
}

impl Triangle {
    /// Check whether `v` is one of the three corners
    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.vertices[0] == v || self.vertices[1] == v || self.vertices[2] == v
    }

    /// Original buffer index of the corner holding `v`
    pub fn corner_index_of(&self, v: VertexId) -> Option<u32> {
        (0..3).find(|&i| self.vertices[i] == v).map(|i| self.corner_indices[i])
    }

    /// Two identical corners make a triangle malformed
    pub fn is_malformed(&self) -> bool {
        self.vertices[0] == self.vertices[1]
            || self.vertices[0] == self.vertices[2]
            || self.vertices[1] == self.vertices[2]
    }
}

type GridKey = (i32, i32, i32);

/// Half-edge-like adjacency graph over unified mesh vertices
#[derive(Debug, Clone)]
pub struct MeshGraph {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    /// Live index count per submesh, kept in sync as triangles are removed
    submesh_index_counts: Vec<usize>,
    /// Grid cell to unified vertex, retained for position queries
    lookup: HashMap<GridKey, VertexId>,
    grid_stretch: f32,
    bounding_sphere_radius: f32,
    has_normals: bool,
}

impl MeshGraph {
    /// Build the simplification graph from raw mesh buffers
    pub fn build(mesh: &MeshBuffers) -> Result<Self> {
        if mesh.vertex_count() == 0 {
            return Err(Error::InvalidMesh("mesh has no vertices".to_string()));
        }
        let radius = mesh.bounding_sphere_radius;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidMesh(format!(
                "bounding sphere radius {} is degenerate",
                radius
            )));
        }
        if mesh.submeshes.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidMesh(format!(
                "{} submeshes exceed the supported submesh count",
                mesh.submeshes.len()
            )));
        }

        let has_normals = mesh.submeshes.iter().all(|s| s.normals.is_some());
        let mut graph = Self {
            vertices: Vec::new(),
            triangles: Vec::with_capacity(mesh.triangle_count()),
            submesh_index_counts: Vec::with_capacity(mesh.submeshes.len()),
            lookup: HashMap::new(),
            grid_stretch: i32::MAX as f32 / radius,
            bounding_sphere_radius: radius,
            has_normals,
        };

        for (submesh_id, submesh) in mesh.submeshes.iter().enumerate() {
            let slot_lookup = graph.add_vertex_buffer(submesh, submesh_id)?;
            graph.submesh_index_counts.push(submesh.indices.len());
            graph.add_index_buffer(submesh, &slot_lookup, submesh_id as u16)?;
        }
        Ok(graph)
    }

    /// Unify one submesh's positions into the arena, returning the
    /// buffer-slot to vertex mapping
    fn add_vertex_buffer(
        &mut self,
        submesh: &SubmeshBuffers,
        submesh_id: usize,
    ) -> Result<Vec<VertexId>> {
        if let Some(normals) = &submesh.normals {
            if normals.len() != submesh.positions.len() {
                return Err(Error::InvalidMesh(format!(
                    "submesh {} has {} normals for {} positions",
                    submesh_id,
                    normals.len(),
                    submesh.positions.len()
                )));
            }
        }

        let mut slot_lookup = Vec::with_capacity(submesh.positions.len());
        for (slot, &position) in submesh.positions.iter().enumerate() {
            let key = self.grid_key(position);
            let (id, created) = match self.lookup.get(&key) {
                Some(&id) => {
                    // A position seen through a second buffer slot is a seam
                    self.vertices[id.index()].seam = true;
                    (id, false)
                }
                None => {
                    let id = VertexId(self.vertices.len() as u32);
                    self.vertices.push(Vertex {
                        position,
                        normal: Vector3f::zeros(),
                        seam: false,
                        edges: Vec::new(),
                        triangles: Vec::new(),
                        collapse_target: None,
                    });
                    self.lookup.insert(key, id);
                    (id, true)
                }
            };

            if self.has_normals {
                if let Some(normals) = &submesh.normals {
                    self.merge_vertex_normal(id, normals[slot], created);
                }
            }
            slot_lookup.push(id);
        }
        Ok(slot_lookup)
    }

    fn merge_vertex_normal(&mut self, id: VertexId, normal: Vector3f, created: bool) {
        let vertex = &mut self.vertices[id.index()];
        if created {
            vertex.normal = normal.try_normalize(0.0).unwrap_or_else(Vector3f::x);
        } else if vertex.normal != normal {
            let sum = vertex.normal + normal;
            vertex.normal = sum.try_normalize(0.0).unwrap_or_else(Vector3f::x);
        }
    }

    fn add_index_buffer(
        &mut self,
        submesh: &SubmeshBuffers,
        slot_lookup: &[VertexId],
        submesh_id: u16,
    ) -> Result<()> {
        if submesh.indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "submesh {} index count {} is not a multiple of 3",
                submesh_id,
                submesh.indices.len()
            )));
        }

        for corners in submesh.indices.chunks_exact(3) {
            let mut vertices = [VertexId(0); 3];
            for (i, &index) in corners.iter().enumerate() {
                let slot = index as usize;
                if slot >= slot_lookup.len() {
                    return Err(Error::InvalidMesh(format!(
                        "submesh {} references vertex {} beyond buffer size {}",
                        submesh_id,
                        index,
                        slot_lookup.len()
                    )));
                }
                vertices[i] = slot_lookup[slot];
            }

            let id = TriangleId(self.triangles.len() as u32);
            let mut triangle = Triangle {
                vertices,
                corner_indices: [corners[0], corners[1], corners[2]],
                submesh: submesh_id,
                normal: Vector3f::zeros(),
                removed: false,
            };
            if triangle.is_malformed() {
                log::debug!(
                    "excluding malformed triangle {} in submesh {}",
                    id.0,
                    submesh_id
                );
                triangle.removed = true;
                self.submesh_index_counts[submesh_id as usize] -= 3;
                self.triangles.push(triangle);
                continue;
            }
            triangle.normal = face_normal(
                self.vertices[vertices[0].index()].position,
                self.vertices[vertices[1].index()].position,
                self.vertices[vertices[2].index()].position,
            );
            self.triangles.push(triangle);
            self.add_triangle_to_edges(id);
        }
        Ok(())
    }

    fn add_triangle_to_edges(&mut self, id: TriangleId) {
        let vertices = self.triangles[id.index()].vertices;
        for &v in &vertices {
            let list = &mut self.vertices[v.index()].triangles;
            if !list.contains(&id) {
                list.push(id);
            }
        }
        for i in 0..3 {
            for n in 0..3 {
                if i != n {
                    self.add_edge(vertices[i], vertices[n]);
                }
            }
        }
    }

    pub(crate) fn add_edge(&mut self, src: VertexId, dst: VertexId) {
        debug_assert_ne!(src, dst, "a vertex must not hold an edge to itself");
        let edges = &mut self.vertices[src.index()].edges;
        match edges.iter_mut().find(|e| e.dst == dst) {
            Some(edge) => edge.ref_count += 1,
            None => edges.push(Edge {
                dst,
                collapse_cost: UNINITIALIZED_COLLAPSE_COST,
                ref_count: 1,
            }),
        }
    }

    pub(crate) fn remove_edge(&mut self, src: VertexId, dst: VertexId) -> Result<()> {
        let edges = &mut self.vertices[src.index()].edges;
        match edges.iter().position(|e| e.dst == dst) {
            Some(pos) => {
                if edges[pos].ref_count == 1 {
                    edges.swap_remove(pos);
                } else {
                    edges[pos].ref_count -= 1;
                }
                Ok(())
            }
            None => Err(Error::InvariantViolation(format!(
                "edge {} -> {} is not in the graph",
                src.0, dst.0
            ))),
        }
    }

    /// Detach a triangle from every vertex and edge except `skip`
    ///
    /// `skip` keeps its lists untouched so callers may still be iterating
    /// them; the collapse clears the skipped vertex wholesale afterwards.
    pub(crate) fn remove_triangle_from_edges(
        &mut self,
        id: TriangleId,
        skip: VertexId,
    ) -> Result<()> {
        let vertices = self.triangles[id.index()].vertices;
        for &v in &vertices {
            if v != skip {
                let list = &mut self.vertices[v.index()].triangles;
                match list.iter().position(|&t| t == id) {
                    Some(pos) => {
                        list.swap_remove(pos);
                    }
                    None => {
                        return Err(Error::InvariantViolation(format!(
                            "triangle {} is not registered on vertex {}",
                            id.0, v.0
                        )))
                    }
                }
            }
        }
        for i in 0..3 {
            for n in 0..3 {
                if i != n && vertices[i] != skip {
                    self.remove_edge(vertices[i], vertices[n])?;
                }
            }
        }
        Ok(())
    }

    /// Re-point one triangle corner from `src` to `dst`
    ///
    /// The triangle joins `dst`'s list but deliberately stays in `src`'s;
    /// the collapse clears `src` at the end.
    pub(crate) fn replace_triangle_corner(
        &mut self,
        id: TriangleId,
        src: VertexId,
        dst: VertexId,
        dst_corner: u32,
    ) -> Result<()> {
        let list = &mut self.vertices[dst.index()].triangles;
        if !list.contains(&id) {
            list.push(id);
        }
        let vertices = self.triangles[id.index()].vertices;
        for i in 0..3 {
            if vertices[i] == src {
                for n in 0..3 {
                    if i != n {
                        self.remove_edge(vertices[n], src)?;
                        self.add_edge(vertices[n], dst);
                        self.add_edge(dst, vertices[n]);
                    }
                }
                let triangle = &mut self.triangles[id.index()];
                triangle.vertices[i] = dst;
                triangle.corner_indices[i] = dst_corner;
                return Ok(());
            }
        }
        Err(Error::InvariantViolation(format!(
            "vertex {} is not a corner of triangle {}",
            src.0, id.0
        )))
    }

    pub(crate) fn mark_triangle_removed(&mut self, id: TriangleId) {
        let triangle = &mut self.triangles[id.index()];
        triangle.removed = true;
        self.submesh_index_counts[triangle.submesh as usize] -= 3;
    }

    /// A vertex with any edge referenced by exactly one triangle is on a border
    pub fn is_border_vertex(&self, v: VertexId) -> bool {
        self.vertices[v.index()].edges.iter().any(|e| e.ref_count == 1)
    }

    /// Look up the directed edge from `src` to `dst`
    pub fn find_edge(&self, src: VertexId, dst: VertexId) -> Option<&Edge> {
        self.vertices[src.index()].edges.iter().find(|e| e.dst == dst)
    }

    /// Find the unified vertex at a position, if any
    pub fn find_vertex(&self, position: Point3f) -> Option<VertexId> {
        self.lookup.get(&self.grid_key(position)).copied()
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.index()]
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id.index()]
    }

    pub fn triangle(&self, id: TriangleId) -> &Triangle {
        &self.triangles[id.index()]
    }

    /// Unique vertices in the arena, including already collapsed ones
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Triangles not yet removed
    pub fn live_triangle_count(&self) -> usize {
        self.triangles.iter().filter(|t| !t.removed).count()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> {
        (0..self.vertices.len() as u32).map(VertexId)
    }

    pub fn submesh_count(&self) -> usize {
        self.submesh_index_counts.len()
    }

    pub fn submesh_index_count(&self, submesh: usize) -> usize {
        self.submesh_index_counts[submesh]
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounding_sphere_radius
    }

    /// Whether every input submesh carried per-vertex normals
    pub fn has_normals(&self) -> bool {
        self.has_normals
    }

    /// Index buffer per submesh from the live triangles, in arena order
    pub fn bake_index_buffers(&self) -> Vec<Vec<u32>> {
        let mut buffers: Vec<Vec<u32>> = self
            .submesh_index_counts
            .iter()
            .map(|&count| Vec::with_capacity(count))
            .collect();
        for triangle in &self.triangles {
            if !triangle.removed {
                buffers[triangle.submesh as usize].extend_from_slice(&triangle.corner_indices);
            }
        }
        buffers
    }

    fn grid_key(&self, p: Point3f) -> GridKey {
        (
            (p.x * self.grid_stretch) as i32,
            (p.y * self.grid_stretch) as i32,
            (p.z * self.grid_stretch) as i32,
        )
    }
}

/// Face normal from the winding order, zero for degenerate positions
pub(crate) fn face_normal(a: Point3f, b: Point3f, c: Point3f) -> Vector3f {
    let e1 = b - a;
    let e2 = c - b;
    e1.cross(&e2).try_normalize(0.0).unwrap_or_else(Vector3f::zeros)
}
