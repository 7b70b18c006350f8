//! Collapse cost strategies
//!
//! A calculator assigns every directed edge the numeric penalty of
//! collapsing its source vertex into its destination. The base calculator
//! scores geometry (border pull, curvature, seams, vertex normals);
//! decorators wrap an inner calculator to weight outside-silhouette
//! vertices or to pin and protect profiled boundary edges.

use crate::graph::{Edge, MeshGraph, VertexId};
use crate::outside::OutsideMarker;
use meshlod_core::{
    CostCalculatorKind, Error, LodConfig, Point3f, ProfiledEdge, Result, NEVER_COLLAPSE_COST,
};
use std::collections::HashMap;

/// Strategy for pricing edge collapses
///
/// `prepare` runs once per graph before any cost is computed;
/// `edge_collapse_cost` is called for the initial fill and again whenever a
/// neighboring collapse invalidates an edge.
pub trait CollapseCost: Send + Sync {
    /// Once-per-graph setup, before any cost query
    fn prepare(&mut self, graph: &MeshGraph) -> Result<()> {
        let _ = graph;
        Ok(())
    }

    /// Cost of collapsing `src` along `edge` into `edge.dst`
    ///
    /// Never negative and never the uninitialized sentinel;
    /// `NEVER_COLLAPSE_COST` forbids the collapse.
    fn edge_collapse_cost(&self, graph: &MeshGraph, src: VertexId, edge: &Edge) -> f32;
}

/// Geometry-based cost, the default calculator
///
/// Border collapses are priced by how much they kink the remaining border,
/// inner collapses by the curvature across the collapsing edge. Seam
/// vertices are penalized heavily, and the whole cost scales with the
/// collapse distance.
pub struct CurvatureCost {
    preserve_boundary_edges: bool,
    use_vertex_normals: bool,
    apply_normal_term: bool,
}

impl CurvatureCost {
    pub fn new(preserve_boundary_edges: bool, use_vertex_normals: bool) -> Self {
        Self {
            preserve_boundary_edges,
            use_vertex_normals,
            apply_normal_term: false,
        }
    }

    /// Whether collapsing `src` into `dst` flips the facing of a surviving
    /// triangle
    fn flips_winding(&self, graph: &MeshGraph, src: VertexId, dst: VertexId) -> bool {
        for &t in &graph.vertex(src).triangles {
            let triangle = graph.triangle(t);
            // Triangles sharing both endpoints die in the collapse anyway
            if triangle.has_vertex(dst) {
                continue;
            }
            let mut p = [Point3f::origin(); 3];
            for (i, &v) in triangle.vertices.iter().enumerate() {
                let v = if v == src { dst } else { v };
                p[i] = graph.vertex(v).position;
            }
            let new_normal = (p[1] - p[0]).cross(&(p[2] - p[1]));
            if new_normal.dot(&triangle.normal) < 0.0 {
                return true;
            }
        }
        false
    }
}

impl CollapseCost for CurvatureCost {
    fn prepare(&mut self, graph: &MeshGraph) -> Result<()> {
        self.apply_normal_term = self.use_vertex_normals && graph.has_normals();
        Ok(())
    }

    fn edge_collapse_cost(&self, graph: &MeshGraph, src: VertexId, edge: &Edge) -> f32 {
        let dst = edge.dst;
        let src_vertex = graph.vertex(src);
        let dst_vertex = graph.vertex(dst);

        if self.preserve_boundary_edges && self.flips_winding(graph, src, dst) {
            return NEVER_COLLAPSE_COST;
        }

        let mut cost: f32;
        if graph.is_border_vertex(src) {
            if edge.ref_count > 1 {
                // Border vertex collapsing inwards, off the border
                cost = 1.0;
            } else {
                // Collapsing along the border: price the kink it leaves in
                // the remaining border polyline. Opposite edges (dot near
                // -1) barely move it.
                cost = -1.0;
                let collapse_edge = (src_vertex.position - dst_vertex.position).normalize();
                for e in &src_vertex.edges {
                    if e.dst != dst && e.ref_count == 1 {
                        let other = graph.vertex(e.dst);
                        let other_border_edge = (src_vertex.position - other.position).normalize();
                        cost = cost.max(other_border_edge.dot(&collapse_edge));
                    }
                }
                cost = (1.002 + cost) * 0.5;
            }
        } else {
            // Inner vertex: curvature term from the triangle facing most
            // away from the faces sharing the collapsing edge
            cost = 1.0;
            for &t in &src_vertex.triangles {
                let triangle = graph.triangle(t);
                let mut min_curvature = -1.0f32;
                for &t2 in &src_vertex.triangles {
                    let other = graph.triangle(t2);
                    if other.has_vertex(dst) {
                        min_curvature = min_curvature.max(triangle.normal.dot(&other.normal));
                    }
                }
                cost = cost.min(min_curvature);
            }
            cost = (1.002 - cost) * 0.5;
        }

        // Collapsing a seam vertex rips texture coordinates, collapsing it
        // into another seam vertex less so
        if src_vertex.seam {
            if !dst_vertex.seam {
                cost = cost.max(0.05);
                cost *= 64.0;
            } else {
                cost = cost.max(0.005);
                cost *= 8.0;
            }
        }

        let dist = (src_vertex.position - dst_vertex.position).norm();
        cost *= dist;

        if self.apply_normal_term {
            let diff = src_vertex.normal.dot(&dst_vertex.normal) / 8.0;
            let mut normal_cost = 0.0f32;
            for e in &src_vertex.edges {
                let neighbor = graph.vertex(e.dst);
                let before_dist = (neighbor.position - src_vertex.position).norm();
                let after_dist = (neighbor.position - dst_vertex.position).norm();
                let before_dot = neighbor.normal.dot(&src_vertex.normal);
                let after_dot = neighbor.normal.dot(&dst_vertex.normal);
                normal_cost = normal_cost.max(
                    diff.max((before_dot - after_dot).abs())
                        * (after_dist / 8.0).max(dist.max((before_dist - after_dist).abs())),
                );
            }
            cost = (normal_cost * 0.25).max(cost);
        }

        debug_assert!(cost >= 0.0);
        cost
    }
}

/// Decorator discouraging collapses of outside-silhouette vertices
pub struct OutsideCost {
    inner: Box<dyn CollapseCost>,
    weight: f32,
    walk_angle: f32,
    marker: Option<OutsideMarker>,
}

impl OutsideCost {
    /// `weight` must be non-zero; `NEVER_COLLAPSE_COST` forbids outside
    /// collapses entirely. `walk_angle` is in radians.
    pub fn new(inner: Box<dyn CollapseCost>, weight: f32, walk_angle: f32) -> Self {
        debug_assert!(weight != 0.0, "outside weight 0 disables the decorator");
        Self {
            inner,
            weight,
            walk_angle,
            marker: None,
        }
    }
}

impl CollapseCost for OutsideCost {
    fn prepare(&mut self, graph: &MeshGraph) -> Result<()> {
        self.inner.prepare(graph)?;
        // Any previous marking belongs to another graph, rebuild from scratch
        self.marker = Some(OutsideMarker::mark(graph, self.walk_angle)?);
        Ok(())
    }

    fn edge_collapse_cost(&self, graph: &MeshGraph, src: VertexId, edge: &Edge) -> f32 {
        let cost = self.inner.edge_collapse_cost(graph, src, edge);
        if cost == NEVER_COLLAPSE_COST {
            return NEVER_COLLAPSE_COST;
        }
        let marker = match &self.marker {
            Some(marker) => marker,
            None => {
                debug_assert!(false, "outside marker queried before prepare");
                return cost;
            }
        };
        if !marker.is_outside(src) && !marker.is_outside(edge.dst) {
            return cost;
        }
        if self.weight == NEVER_COLLAPSE_COST {
            return NEVER_COLLAPSE_COST;
        }
        let factor = (self.weight * 8.0).max(0.0078125).min(NEVER_COLLAPSE_COST);
        (cost * factor).min(NEVER_COLLAPSE_COST)
    }
}

/// Decorator pinning profiled edge costs and protecting open borders
pub struct ProfileBoundaryCost {
    inner: Box<dyn CollapseCost>,
    profile: Vec<ProfiledEdge>,
    pinned: HashMap<(VertexId, VertexId), f32>,
}

impl ProfileBoundaryCost {
    pub fn new(inner: Box<dyn CollapseCost>, profile: Vec<ProfiledEdge>) -> Self {
        Self {
            inner,
            profile,
            pinned: HashMap::new(),
        }
    }
}

impl CollapseCost for ProfileBoundaryCost {
    fn prepare(&mut self, graph: &MeshGraph) -> Result<()> {
        self.inner.prepare(graph)?;
        self.pinned.clear();
        for edge in &self.profile {
            let src = graph.find_vertex(edge.src).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "profiled edge source ({}, {}, {}) matches no mesh vertex",
                    edge.src.x, edge.src.y, edge.src.z
                ))
            })?;
            let dst = graph.find_vertex(edge.dst).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "profiled edge destination ({}, {}, {}) matches no mesh vertex",
                    edge.dst.x, edge.dst.y, edge.dst.z
                ))
            })?;
            self.pinned.insert((src, dst), edge.cost);
        }
        Ok(())
    }

    fn edge_collapse_cost(&self, graph: &MeshGraph, src: VertexId, edge: &Edge) -> f32 {
        if let Some(&cost) = self.pinned.get(&(src, edge.dst)) {
            return cost;
        }
        if graph.is_border_vertex(src) {
            return NEVER_COLLAPSE_COST;
        }
        self.inner.edge_collapse_cost(graph, src, edge)
    }
}

/// Assemble the calculator chain a configuration asks for
pub fn build_calculator(config: &LodConfig) -> Box<dyn CollapseCost> {
    let base = CurvatureCost::new(config.preserve_boundary_edges, config.use_vertex_normals);
    match config.calculator {
        CostCalculatorKind::Default => Box::new(base),
        CostCalculatorKind::OutsideWeighted => Box::new(OutsideCost::new(
            Box::new(base),
            config.outside_weight,
            config.outside_walk_angle,
        )),
        CostCalculatorKind::ProfileBoundary => Box::new(ProfileBoundaryCost::new(
            Box::new(base),
            config.profile.clone(),
        )),
        CostCalculatorKind::Combined => {
            let outside = OutsideCost::new(
                Box::new(base),
                config.outside_weight,
                config.outside_walk_angle,
            );
            Box::new(ProfileBoundaryCost::new(
                Box::new(outside),
                config.profile.clone(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meshlod_core::{MeshBuffers, SubmeshBuffers, UNINITIALIZED_COLLAPSE_COST};
    use std::f32::consts::FRAC_PI_2;

    fn make_tetrahedron() -> MeshBuffers {
        MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, 0.5, 1.0),
            ],
            vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
        )])
    }

    fn make_cube() -> MeshBuffers {
        MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(1.0, 0.0, 1.0),
                Point3f::new(1.0, 1.0, 1.0),
                Point3f::new(0.0, 1.0, 1.0),
            ],
            vec![
                4, 5, 6, 4, 6, 7, 1, 0, 3, 1, 3, 2, 0, 1, 5, 0, 5, 4, 3, 7, 6, 3, 6, 2, 0, 4, 7,
                0, 7, 3, 1, 2, 6, 1, 6, 5,
            ],
        )])
    }

    /// Two coplanar triangles where collapsing A into D flips (A,B,C)
    fn make_flip_case() -> MeshBuffers {
        MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
            vec![
                Point3f::new(0.0, 0.0, 0.0), // A
                Point3f::new(1.0, 0.0, 0.0), // B
                Point3f::new(0.0, 1.0, 0.0), // C
                Point3f::new(2.0, 2.0, 0.0), // D
            ],
            vec![0, 1, 2, 0, 3, 1],
        )])
    }

    fn cost_of(
        calc: &dyn CollapseCost,
        graph: &MeshGraph,
        src: Point3f,
        dst: Point3f,
    ) -> f32 {
        let src = graph.find_vertex(src).unwrap();
        let dst = graph.find_vertex(dst).unwrap();
        let edge = graph.find_edge(src, dst).unwrap();
        calc.edge_collapse_cost(graph, src, edge)
    }

    // ---- CurvatureCost tests ----

    #[test]
    fn test_costs_valid_on_closed_and_open_meshes() {
        for mesh in [make_tetrahedron(), make_cube(), make_flip_case()] {
            let graph = MeshGraph::build(&mesh).unwrap();
            let mut calc = CurvatureCost::new(true, true);
            calc.prepare(&graph).unwrap();
            for v in graph.vertex_ids() {
                for edge in &graph.vertex(v).edges {
                    let cost = calc.edge_collapse_cost(&graph, v, edge);
                    assert!(cost >= 0.0);
                    assert_ne!(cost, UNINITIALIZED_COLLAPSE_COST);
                }
            }
        }
    }

    #[test]
    fn test_winding_flip_forbidden_when_preserving() {
        let mesh = make_flip_case();
        let graph = MeshGraph::build(&mesh).unwrap();
        let a = Point3f::new(0.0, 0.0, 0.0);
        let d = Point3f::new(2.0, 2.0, 0.0);

        let mut strict = CurvatureCost::new(true, true);
        strict.prepare(&graph).unwrap();
        assert_eq!(cost_of(&strict, &graph, a, d), NEVER_COLLAPSE_COST);

        let mut relaxed = CurvatureCost::new(false, true);
        relaxed.prepare(&graph).unwrap();
        let cost = cost_of(&relaxed, &graph, a, d);
        assert!(cost < NEVER_COLLAPSE_COST);
        assert!(cost >= 0.0);
    }

    #[test]
    fn test_seam_penalty_ordering() {
        // Same geometry in three flavors; extra unreferenced duplicate
        // slots only flip the seam flags
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.5, 1.0, 0.0),
            Point3f::new(0.5, 0.5, 1.0),
        ];
        let indices = vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3];
        let src = Point3f::new(0.0, 0.0, 0.0);
        let dst = Point3f::new(1.0, 0.0, 0.0);

        let cost_with_duplicates = |duplicates: &[usize]| {
            let mut all = positions.clone();
            for &slot in duplicates {
                all.push(positions[slot]);
            }
            let mesh =
                MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(all, indices.clone())]);
            let graph = MeshGraph::build(&mesh).unwrap();
            let mut calc = CurvatureCost::new(false, false);
            calc.prepare(&graph).unwrap();
            cost_of(&calc, &graph, src, dst)
        };

        let plain = cost_with_duplicates(&[]);
        let seam_to_seam = cost_with_duplicates(&[0, 1]);
        let seam_to_plain = cost_with_duplicates(&[0]);
        assert!(seam_to_plain >= seam_to_seam);
        assert!(seam_to_seam >= plain);
        assert!(plain > 0.0);
    }

    // ---- OutsideCost tests ----

    #[test]
    fn test_outside_weight_scales_cost() {
        let mesh = make_cube();
        let graph = MeshGraph::build(&mesh).unwrap();
        let src = Point3f::new(0.0, 0.0, 0.0);
        let dst = Point3f::new(1.0, 0.0, 0.0);

        let mut base = CurvatureCost::new(false, false);
        base.prepare(&graph).unwrap();
        let base_cost = cost_of(&base, &graph, src, dst);

        let mut weighted = OutsideCost::new(
            Box::new(CurvatureCost::new(false, false)),
            0.25,
            FRAC_PI_2,
        );
        weighted.prepare(&graph).unwrap();
        let weighted_cost = cost_of(&weighted, &graph, src, dst);

        // Every cube vertex is outside, so the factor max(0.0078125, 8w)
        // always applies
        assert_relative_eq!(weighted_cost, base_cost * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_outside_weight_sentinel_forbids_collapse() {
        let mesh = make_cube();
        let graph = MeshGraph::build(&mesh).unwrap();
        let mut calc = OutsideCost::new(
            Box::new(CurvatureCost::new(false, false)),
            NEVER_COLLAPSE_COST,
            FRAC_PI_2,
        );
        calc.prepare(&graph).unwrap();
        for v in graph.vertex_ids() {
            for edge in &graph.vertex(v).edges {
                assert_eq!(
                    calc.edge_collapse_cost(&graph, v, edge),
                    NEVER_COLLAPSE_COST
                );
            }
        }
    }

    #[test]
    fn test_tiny_outside_weight_floors_at_magic_factor() {
        let mesh = make_cube();
        let graph = MeshGraph::build(&mesh).unwrap();
        let src = Point3f::new(0.0, 0.0, 0.0);
        let dst = Point3f::new(1.0, 0.0, 0.0);

        let mut base = CurvatureCost::new(false, false);
        base.prepare(&graph).unwrap();
        let base_cost = cost_of(&base, &graph, src, dst);

        let mut weighted = OutsideCost::new(
            Box::new(CurvatureCost::new(false, false)),
            1e-6,
            FRAC_PI_2,
        );
        weighted.prepare(&graph).unwrap();
        let weighted_cost = cost_of(&weighted, &graph, src, dst);
        assert_relative_eq!(weighted_cost, base_cost * 0.0078125, epsilon = 1e-9);
    }

    // ---- ProfileBoundaryCost tests ----

    #[test]
    fn test_profile_pins_edge_cost() {
        let mesh = make_tetrahedron();
        let graph = MeshGraph::build(&mesh).unwrap();
        let src = Point3f::new(0.0, 0.0, 0.0);
        let dst = Point3f::new(1.0, 0.0, 0.0);

        let mut calc = ProfileBoundaryCost::new(
            Box::new(CurvatureCost::new(false, false)),
            vec![ProfiledEdge {
                src,
                dst,
                cost: 42.0,
            }],
        );
        calc.prepare(&graph).unwrap();
        assert_eq!(cost_of(&calc, &graph, src, dst), 42.0);
        // The reverse direction is not pinned
        assert_ne!(cost_of(&calc, &graph, dst, src), 42.0);
    }

    #[test]
    fn test_profile_rejects_unknown_position() {
        let mesh = make_tetrahedron();
        let graph = MeshGraph::build(&mesh).unwrap();
        let mut calc = ProfileBoundaryCost::new(
            Box::new(CurvatureCost::new(false, false)),
            vec![ProfiledEdge {
                src: Point3f::new(9.0, 9.0, 9.0),
                dst: Point3f::new(1.0, 0.0, 0.0),
                cost: 1.0,
            }],
        );
        assert!(matches!(
            calc.prepare(&graph),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_border_source_forbidden() {
        // A single triangle is all border
        let mesh = MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
            ],
            vec![0, 1, 2],
        )]);
        let graph = MeshGraph::build(&mesh).unwrap();
        let mut calc =
            ProfileBoundaryCost::new(Box::new(CurvatureCost::new(false, false)), Vec::new());
        calc.prepare(&graph).unwrap();
        for v in graph.vertex_ids() {
            for edge in &graph.vertex(v).edges {
                assert_eq!(
                    calc.edge_collapse_cost(&graph, v, edge),
                    NEVER_COLLAPSE_COST
                );
            }
        }
    }
}
