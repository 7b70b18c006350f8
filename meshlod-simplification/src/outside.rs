//! Outside-vertex marking against a convex hull proxy
//!
//! Builds an incremental convex hull over the graph vertex positions, then
//! flood-walks the mesh surface from each hull triangle across faces whose
//! normal stays within the walk angle of that hull triangle. Every vertex
//! reached by a walk is on the outward silhouette.

use crate::graph::{face_normal, MeshGraph, VertexId};
use meshlod_core::{Error, Point3f, Result, Vector3f};

/// Per-vertex silhouette classification over a mesh graph
///
/// The hull used for classification is internal and dropped once the flags
/// are computed; only the flag vector is retained.
#[derive(Debug, Clone)]
pub struct OutsideMarker {
    outside: Vec<bool>,
}

impl OutsideMarker {
    /// Classify every vertex, walking faces within `walk_angle` radians of
    /// each hull triangle's facing
    pub fn mark(graph: &MeshGraph, walk_angle: f32) -> Result<Self> {
        let hull = ConvexHull::build(graph)?;
        Ok(Self {
            outside: hull.mark_outer_wall(walk_angle.cos()),
        })
    }

    /// Whether the vertex lies on the outward silhouette
    #[inline]
    pub fn is_outside(&self, v: VertexId) -> bool {
        self.outside[v.index()]
    }
}

struct HullTriangle {
    vertices: [VertexId; 3],
    normal: Vector3f,
    removed: bool,
}

struct ConvexHull<'a> {
    graph: &'a MeshGraph,
    triangles: Vec<HullTriangle>,
    /// Vertices already absorbed by the hull, skipped during expansion
    inside_hull: Vec<bool>,
    centroid: Point3f,
    /// Tolerance for coplanarity tests, scaled to the mesh size
    epsilon: f32,
}

impl<'a> ConvexHull<'a> {
    fn build(graph: &'a MeshGraph) -> Result<Self> {
        let mut hull = Self {
            graph,
            triangles: Vec::new(),
            inside_hull: vec![false; graph.vertex_count()],
            centroid: Point3f::origin(),
            epsilon: graph.bounding_sphere_radius() * f32::EPSILON * 4.0,
        };
        hull.seed()?;
        hull.expand();
        hull.triangles.retain(|t| !t.removed);
        Ok(hull)
    }

    /// Seed the hull with a tetrahedron of four extreme vertices
    fn seed(&mut self) -> Result<()> {
        let mut seed0 = VertexId(0);
        let mut min_y = f32::MAX;
        for v in self.graph.vertex_ids() {
            let y = self.position(v).y;
            if y < min_y {
                min_y = y;
                seed0 = v;
            }
        }
        let p0 = self.position(seed0);

        let seed1 = self
            .furthest_by(|p| (p - p0).norm_squared())
            .ok_or_else(degenerate_hull)?;
        let p1 = self.position(seed1);

        let seed2 = self
            .furthest_by(|p| point_line_distance_squared(p0, p1, p))
            .ok_or_else(degenerate_hull)?;
        let p2 = self.position(seed2);

        let plane_normal = (p1 - p0)
            .cross(&(p2 - p0))
            .try_normalize(0.0)
            .ok_or_else(degenerate_hull)?;
        let seed3 = self
            .furthest_by(|p| plane_normal.dot(&(p - p0)).abs())
            .ok_or_else(degenerate_hull)?;
        let p3 = self.position(seed3);

        // The centroid is only guaranteed to be interior for a real volume
        if tetrahedron_volume(p0, p1, p2, p3) <= self.epsilon {
            return Err(degenerate_hull());
        }
        self.centroid = Point3f::from((p0.coords + p1.coords + p2.coords + p3.coords) / 4.0);

        for &s in &[seed0, seed1, seed2, seed3] {
            self.inside_hull[s.index()] = true;
        }
        self.push_triangle(seed0, seed1, seed2);
        self.push_triangle(seed0, seed1, seed3);
        self.push_triangle(seed0, seed2, seed3);
        self.push_triangle(seed1, seed2, seed3);
        Ok(())
    }

    /// Absorb the furthest remaining vertex in front of each hull triangle
    ///
    /// Indexed loop on purpose: `add_hull_vertex` appends replacement
    /// triangles, and those must be expanded as well.
    fn expand(&mut self) {
        let mut i = 0;
        while i < self.triangles.len() {
            if !self.triangles[i].removed {
                if let Some(v) = self.furthest_from_triangle(i) {
                    self.add_hull_vertex(v);
                }
            }
            i += 1;
        }
    }

    fn furthest_by<F>(&self, measure: F) -> Option<VertexId>
    where
        F: Fn(Point3f) -> f32,
    {
        let mut best = None;
        let mut best_dist = 0.0f32;
        for v in self.graph.vertex_ids() {
            let dist = measure(self.position(v));
            if dist > best_dist {
                best_dist = dist;
                best = Some(v);
            }
        }
        best
    }

    fn furthest_from_triangle(&self, tri: usize) -> Option<VertexId> {
        let t = &self.triangles[tri];
        let origin = self.position(t.vertices[0]);
        let normal = t.normal;
        let mut best = None;
        let mut best_dist = 0.0f32;
        for v in self.graph.vertex_ids() {
            if self.inside_hull[v.index()] {
                continue;
            }
            let dist = normal.dot(&(self.position(v) - origin));
            if dist > best_dist {
                best_dist = dist;
                best = Some(v);
            }
        }
        best
    }

    fn add_hull_vertex(&mut self, target: VertexId) {
        self.inside_hull[target.index()] = true;
        let visible = self.visible_triangles(target);
        if visible.is_empty() {
            return;
        }
        let horizon = self.horizon_edges(&visible);
        for (a, b) in horizon {
            self.push_triangle(a, b, target);
        }
    }

    /// Hull triangles facing `target`, empty when the hull already contains it
    fn visible_triangles(&self, target: VertexId) -> Vec<usize> {
        let target_pos = self.position(target);
        let mut visible = Vec::new();
        for (i, t) in self.triangles.iter().enumerate() {
            if t.removed {
                continue;
            }
            let plane_dot = t.normal.dot(&self.position(t.vertices[0]).coords);
            let target_dot = t.normal.dot(&target_pos.coords);
            if (target_dot - plane_dot).abs() <= self.epsilon {
                // On the triangle plane: inside the triangle means inside
                // the hull, no expansion at all
                if self.inside_triangle(target_pos, t) {
                    return Vec::new();
                }
                visible.push(i);
            } else if plane_dot < target_dot {
                visible.push(i);
            }
        }
        visible
    }

    /// Boundary edges of the visible patch; also removes its triangles
    fn horizon_edges(&mut self, visible: &[usize]) -> Vec<(VertexId, VertexId)> {
        let mut edges = Vec::with_capacity(visible.len() * 3);
        for &i in visible {
            let t = &mut self.triangles[i];
            let [a, b, c] = t.vertices;
            edges.push(undirected(a, b));
            edges.push(undirected(b, c));
            edges.push(undirected(c, a));
            t.removed = true;
        }
        // Edges shared by two visible triangles are interior, not horizon
        edges.sort_unstable();
        let mut horizon = Vec::with_capacity(edges.len());
        let mut i = 0;
        while i < edges.len() {
            let mut n = i + 1;
            while n < edges.len() && edges[n] == edges[i] {
                n += 1;
            }
            if n - i == 1 {
                horizon.push(edges[i]);
            }
            i = n;
        }
        horizon
    }

    fn push_triangle(&mut self, a: VertexId, b: VertexId, c: VertexId) {
        let normal = face_normal(self.position(a), self.position(b), self.position(c));
        let (vertices, normal) = if self.faces_point(&normal, a, self.centroid) {
            // Flip so the triangle faces away from the hull interior
            let flipped = face_normal(self.position(b), self.position(a), self.position(c));
            ([b, a, c], flipped)
        } else {
            ([a, b, c], normal)
        };
        self.triangles.push(HullTriangle {
            vertices,
            normal,
            removed: false,
        });
    }

    fn faces_point(&self, normal: &Vector3f, on_plane: VertexId, p: Point3f) -> bool {
        normal.dot(&self.position(on_plane).coords) < normal.dot(&p.coords)
    }

    /// Point-in-triangle for a point already known to be on the plane
    fn inside_triangle(&self, p: Point3f, t: &HullTriangle) -> bool {
        let p0 = self.position(t.vertices[0]);
        let p1 = self.position(t.vertices[1]);
        let p2 = self.position(t.vertices[2]);
        let n = t.normal;

        let d0 = edge_side(p, p0, p1, n);
        if d0.abs() <= self.epsilon {
            return self.on_segment(p, p0, p1);
        }
        let d1 = edge_side(p, p1, p2, n);
        if d1.abs() <= self.epsilon {
            return self.on_segment(p, p1, p2);
        }
        if (d0 < 0.0) != (d1 < 0.0) {
            return false;
        }
        let d2 = edge_side(p, p2, p0, n);
        if d2.abs() <= self.epsilon {
            return self.on_segment(p, p2, p0);
        }
        (d1 < 0.0) == (d2 < 0.0)
    }

    /// Whether `p` sits between `a` and `b` on their shared line
    fn on_segment(&self, p: Point3f, a: Point3f, b: Point3f) -> bool {
        let v1 = b - a;
        let v2 = p - a;
        self.same_position(p, b) || (v1.dot(&v2) > 0.0 && v1.norm_squared() > v2.norm_squared())
    }

    fn same_position(&self, a: Point3f, b: Point3f) -> bool {
        (a.x - b.x).abs() <= self.epsilon
            && (a.y - b.y).abs() <= self.epsilon
            && (a.z - b.z).abs() <= self.epsilon
    }

    /// Flood-walk the mesh from every hull triangle, collecting outside flags
    fn mark_outer_wall(&self, walk_threshold: f32) -> Vec<bool> {
        let mut outside = vec![false; self.graph.vertex_count()];
        let mut in_pass = vec![false; self.graph.vertex_count()];
        let mut stack: Vec<VertexId> = Vec::new();

        for hull_tri in &self.triangles {
            in_pass.fill(false);
            stack.clear();
            for &v in &hull_tri.vertices {
                visit(v, &mut outside, &mut in_pass, &mut stack);
            }
            while let Some(v) = stack.pop() {
                for &t in &self.graph.vertex(v).triangles {
                    let tri = self.graph.triangle(t);
                    if hull_tri.normal.dot(&tri.normal) > walk_threshold {
                        for &tv in &tri.vertices {
                            visit(tv, &mut outside, &mut in_pass, &mut stack);
                        }
                    }
                }
            }
        }
        outside
    }

    #[inline]
    fn position(&self, v: VertexId) -> Point3f {
        self.graph.vertex(v).position
    }
}

fn visit(v: VertexId, outside: &mut [bool], in_pass: &mut [bool], stack: &mut Vec<VertexId>) {
    if !in_pass[v.index()] {
        in_pass[v.index()] = true;
        outside[v.index()] = true;
        stack.push(v);
    }
}

fn undirected(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn edge_side(p: Point3f, a: Point3f, b: Point3f, n: Vector3f) -> f32 {
    n.cross(&(b - a)).dot(&(p - a))
}

fn point_line_distance_squared(a: Point3f, b: Point3f, p: Point3f) -> f32 {
    let up = (b - a).cross(&(a - p)).norm_squared();
    let down = (b - a).norm_squared();
    up / down
}

fn tetrahedron_volume(a: Point3f, b: Point3f, c: Point3f, d: Point3f) -> f32 {
    (a - d).dot(&(b - d).cross(&(c - d))).abs() / 6.0
}

fn degenerate_hull() -> Error {
    Error::InvalidMesh("convex hull needs at least four non-coplanar vertices".to_string())
}
