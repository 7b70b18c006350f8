//! Greedy priority-driven edge collapsing
//!
//! The collapser owns the cost heap over a mesh graph. Each step merges the
//! globally cheapest source vertex into its collapse target, repairs the
//! neighborhood topology, reprices the affected edges and appends a record
//! of what was removed.

use crate::cost::CollapseCost;
use crate::graph::{MeshGraph, TriangleId, VertexId};
use meshlod_core::{
    CancelToken, CollapseRecord, Error, Result, NEVER_COLLAPSE_COST, UNINITIALIZED_COLLAPSE_COST,
};
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Collapser lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapserState {
    Uninitialized,
    CostsComputed,
    Collapsing,
    Done,
}

/// Heap priority of a pending collapse
///
/// Ordering is reversed so the max-heap pops the cheapest collapse first;
/// equal costs break by lowest source then lowest destination id, keeping
/// collapse order independent of memory layout.
#[derive(Debug, Clone, Copy)]
struct HeapKey {
    cost: f32,
    src: VertexId,
    dst: VertexId,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost).is_eq() && self.src == other.src && self.dst == other.dst
    }
}

impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.src.cmp(&self.src))
            .then_with(|| other.dst.cmp(&self.dst))
    }
}

/// Connection record for re-pointing surviving triangles in one collapse
///
/// Collapsing across submeshes must keep each triangle inside its own
/// vertex buffer, so candidates are matched per submesh.
struct CollapsedEdge {
    src_corner: u32,
    dst_corner: u32,
    submesh: u16,
}

/// Greedy edge collapser over a mesh graph
pub struct Collapser {
    heap: PriorityQueue<VertexId, HeapKey>,
    state: CollapserState,
    collapse_log: Vec<CollapseRecord>,
    /// Unique vertices still present in the graph
    vertex_count: usize,
    /// Scratch reused across collapse steps
    collapsed_edges: Vec<CollapsedEdge>,
}

impl Collapser {
    pub fn new(graph: &MeshGraph) -> Self {
        Self {
            heap: PriorityQueue::with_capacity(graph.vertex_count()),
            state: CollapserState::Uninitialized,
            collapse_log: Vec::new(),
            vertex_count: graph.vertex_count(),
            collapsed_edges: Vec::new(),
        }
    }

    pub fn state(&self) -> CollapserState {
        self.state
    }

    /// Unique vertices remaining, counting never-referenced ones
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Every collapse applied so far, oldest first
    pub fn collapse_log(&self) -> &[CollapseRecord] {
        &self.collapse_log
    }

    /// Cheapest pending collapse cost, if any vertex is still collapsible
    pub fn min_cost(&self) -> Option<f32> {
        self.heap.peek().map(|(_, key)| key.cost)
    }

    /// Price every live edge and seed the heap; call once per graph
    pub fn init_collapse_costs(
        &mut self,
        graph: &mut MeshGraph,
        calculator: &mut dyn CollapseCost,
    ) -> Result<()> {
        calculator.prepare(graph)?;

        self.heap.clear();
        self.collapse_log.clear();
        self.vertex_count = graph.vertex_count();

        // Price all edges in parallel; costs land in vertex id order, so
        // the sequential write-back below stays deterministic
        let costs: Vec<(VertexId, Vec<f32>)> = {
            let graph: &MeshGraph = graph;
            let calc: &dyn CollapseCost = calculator;
            (0..graph.vertex_count() as u32)
                .into_par_iter()
                .map(VertexId)
                .map(|v| {
                    let edge_costs = graph
                        .vertex(v)
                        .edges
                        .iter()
                        .map(|edge| calc.edge_collapse_cost(graph, v, edge))
                        .collect();
                    (v, edge_costs)
                })
                .collect()
        };

        for (v, edge_costs) in &costs {
            if edge_costs.is_empty() {
                log::debug!("vertex {} is referenced by no triangle, excluded", v.0);
                continue;
            }
            self.write_costs_and_requeue(graph, *v, edge_costs);
        }
        self.state = CollapserState::CostsComputed;
        Ok(())
    }

    /// Collapse until `vertex_target` is reached or the cheapest remaining
    /// cost is at or above `cost_limit`
    ///
    /// Stopping short of the target is a normal partial reduction, not a
    /// fault. Returns the number of collapses performed.
    pub fn collapse_to(
        &mut self,
        graph: &mut MeshGraph,
        calculator: &dyn CollapseCost,
        vertex_target: usize,
        cost_limit: f32,
        cancel: &CancelToken,
    ) -> Result<usize> {
        if self.state == CollapserState::Uninitialized {
            return Err(Error::InvariantViolation(
                "collapse requested before costs were initialized".to_string(),
            ));
        }
        let mut performed = 0;
        while vertex_target < self.vertex_count {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.heap.peek() {
                Some((_, key)) if key.cost < cost_limit => {
                    self.collapse_step(graph, calculator)?;
                    performed += 1;
                }
                _ => break,
            }
        }
        Ok(performed)
    }

    /// Merge the cheapest source vertex into its collapse target
    pub fn collapse_step(
        &mut self,
        graph: &mut MeshGraph,
        calculator: &dyn CollapseCost,
    ) -> Result<()> {
        let (src, key) = match self.heap.pop() {
            Some(entry) => entry,
            None => {
                return Err(Error::InvariantViolation(
                    "collapse requested with an empty cost heap".to_string(),
                ))
            }
        };
        debug_assert!(key.cost != NEVER_COLLAPSE_COST);
        debug_assert!(key.cost != UNINITIALIZED_COLLAPSE_COST);

        self.state = CollapserState::Collapsing;
        match self.collapse_vertex(graph, calculator, src) {
            Ok(()) => {
                self.vertex_count -= 1;
                Ok(())
            }
            Err(err) => {
                log::error!("collapse of vertex {} aborted the task: {}", src.0, err);
                Err(err)
            }
        }
    }

    /// Mark the state machine finished once the driving loop is done
    pub fn finish(&mut self) {
        self.state = CollapserState::Done;
    }

    fn collapse_vertex(
        &mut self,
        graph: &mut MeshGraph,
        calculator: &dyn CollapseCost,
        src: VertexId,
    ) -> Result<()> {
        let src_vertex = graph.vertex(src);
        let dst = match src_vertex.collapse_target {
            Some(dst) => dst,
            None => {
                return Err(Error::InvariantViolation(format!(
                    "vertex {} has no collapse target",
                    src.0
                )))
            }
        };
        if src_vertex.edges.is_empty() || src_vertex.triangles.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "vertex {} was already collapsed",
                src.0
            )));
        }
        if graph.find_edge(src, dst).is_none() {
            return Err(Error::InvariantViolation(format!(
                "vertex {} has no edge to its collapse target {}",
                src.0, dst.0
            )));
        }

        // Pass 1: drop every triangle sharing the collapsing edge,
        // remembering one corner mapping per (corner, submesh) so the
        // survivors can follow the right vertex buffer
        self.collapsed_edges.clear();
        let mut removed_triangles = Vec::new();
        let src_triangles = graph.vertex(src).triangles.clone();
        for &t in &src_triangles {
            if !graph.triangle(t).has_vertex(dst) {
                continue;
            }
            let src_corner = corner_of(graph, t, src)?;
            let dst_corner = corner_of(graph, t, dst)?;
            let submesh = graph.triangle(t).submesh;
            if !self.has_collapsed_edge(src_corner, submesh) {
                self.collapsed_edges.push(CollapsedEdge {
                    src_corner,
                    dst_corner,
                    submesh,
                });
            }
            graph.mark_triangle_removed(t);
            graph.remove_triangle_from_edges(t, src)?;
            removed_triangles.push(t.0);
        }
        if self.collapsed_edges.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "no triangle shares the collapsing edge {} -> {}",
                src.0, dst.0
            )));
        }
        debug_assert!(graph.find_edge(dst, src).is_none());

        // Pass 2: re-point the surviving triangles from src to dst, or
        // destroy them when no collapsed edge of their submesh exists
        for &t in &src_triangles {
            if graph.triangle(t).has_vertex(dst) {
                continue;
            }
            let src_corner = corner_of(graph, t, src)?;
            let submesh = graph.triangle(t).submesh;
            match self.find_destination_corner(src_corner, submesh) {
                Some(dst_corner) => {
                    graph.replace_triangle_corner(t, src, dst, dst_corner)?;
                }
                None => {
                    graph.mark_triangle_removed(t);
                    graph.remove_triangle_from_edges(t, src)?;
                    removed_triangles.push(t.0);
                }
            }
        }

        let src_seam = graph.vertex(src).seam;
        if src_seam {
            graph.vertex_mut(dst).seam = true;
        }

        // Reprice everything that was adjacent to src; dst is among them
        let neighbors: Vec<VertexId> = graph.vertex(src).edges.iter().map(|e| e.dst).collect();
        for n in neighbors {
            self.update_vertex_cost(graph, n, calculator);
        }

        let vertex = graph.vertex_mut(src);
        vertex.edges.clear();
        vertex.triangles.clear();
        vertex.collapse_target = None;

        self.collapse_log.push(CollapseRecord {
            src: src.0,
            dst: dst.0,
            removed_triangles,
        });
        Ok(())
    }

    fn update_vertex_cost(
        &mut self,
        graph: &mut MeshGraph,
        v: VertexId,
        calculator: &dyn CollapseCost,
    ) {
        let vertex = graph.vertex(v);
        let edge_costs: Vec<f32> = vertex
            .edges
            .iter()
            .map(|edge| calculator.edge_collapse_cost(graph, v, edge))
            .collect();
        self.write_costs_and_requeue(graph, v, &edge_costs);
    }

    /// Store per-edge costs and sync the vertex's heap entry
    ///
    /// The cheapest edge becomes the collapse target, ties broken by
    /// lowest destination id. A vertex without edges leaves the heap.
    fn write_costs_and_requeue(&mut self, graph: &mut MeshGraph, v: VertexId, edge_costs: &[f32]) {
        let vertex = graph.vertex_mut(v);
        let mut best_cost = UNINITIALIZED_COLLAPSE_COST;
        let mut best_dst: Option<VertexId> = None;
        for (edge, &cost) in vertex.edges.iter_mut().zip(edge_costs) {
            edge.collapse_cost = cost;
            let better = match best_dst {
                None => true,
                Some(dst) => cost < best_cost || (cost == best_cost && edge.dst < dst),
            };
            if better {
                best_cost = cost;
                best_dst = Some(edge.dst);
            }
        }
        match best_dst {
            Some(dst) => {
                vertex.collapse_target = Some(dst);
                self.heap.push(
                    v,
                    HeapKey {
                        cost: best_cost,
                        src: v,
                        dst,
                    },
                );
            }
            None => {
                vertex.collapse_target = None;
                self.heap.remove(&v);
            }
        }
    }

    fn has_collapsed_edge(&self, src_corner: u32, submesh: u16) -> bool {
        self.collapsed_edges
            .iter()
            .any(|e| e.src_corner == src_corner && e.submesh == submesh)
    }

    /// Exact corner match first, then any collapsed edge of the submesh
    fn find_destination_corner(&self, src_corner: u32, submesh: u16) -> Option<u32> {
        self.collapsed_edges
            .iter()
            .find(|e| e.src_corner == src_corner && e.submesh == submesh)
            .or_else(|| self.collapsed_edges.iter().find(|e| e.submesh == submesh))
            .map(|e| e.dst_corner)
    }
}

fn corner_of(graph: &MeshGraph, t: TriangleId, v: VertexId) -> Result<u32> {
    graph.triangle(t).corner_index_of(v).ok_or_else(|| {
        Error::InvariantViolation(format!(
            "vertex {} is not a corner of triangle {}",
            v.0, t.0
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CurvatureCost, OutsideCost};
    use meshlod_core::{MeshBuffers, Point3f, SubmeshBuffers};
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

    fn make_plane_grid(n: usize) -> MeshBuffers {
        let mut positions = Vec::new();
        for y in 0..n {
            for x in 0..n {
                positions.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut indices = Vec::new();
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let a = (y * n + x) as u32;
                let b = a + 1;
                let c = a + n as u32;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, c, b, d, c]);
            }
        }
        MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(positions, indices)])
    }

    fn init(mesh: &MeshBuffers) -> (MeshGraph, Collapser, CurvatureCost) {
        let mut graph = MeshGraph::build(mesh).unwrap();
        let mut collapser = Collapser::new(&graph);
        let mut calc = CurvatureCost::new(false, false);
        collapser.init_collapse_costs(&mut graph, &mut calc).unwrap();
        (graph, collapser, calc)
    }

    #[test]
    fn test_state_transitions() {
        let mesh = make_tetrahedron();
        let mut graph = MeshGraph::build(&mesh).unwrap();
        let mut collapser = Collapser::new(&graph);
        assert_eq!(collapser.state(), CollapserState::Uninitialized);

        let mut calc = CurvatureCost::new(false, false);
        collapser.init_collapse_costs(&mut graph, &mut calc).unwrap();
        assert_eq!(collapser.state(), CollapserState::CostsComputed);

        collapser
            .collapse_to(&mut graph, &calc, 3, NEVER_COLLAPSE_COST, &CancelToken::new())
            .unwrap();
        assert_eq!(collapser.state(), CollapserState::Collapsing);
        assert_eq!(collapser.vertex_count(), 3);

        collapser.finish();
        assert_eq!(collapser.state(), CollapserState::Done);
    }

    #[test]
    fn test_collapse_before_init_is_invariant_violation() {
        let mesh = make_tetrahedron();
        let mut graph = MeshGraph::build(&mesh).unwrap();
        let mut collapser = Collapser::new(&graph);
        let calc = CurvatureCost::new(false, false);
        assert!(matches!(
            collapser.collapse_to(&mut graph, &calc, 1, NEVER_COLLAPSE_COST, &CancelToken::new()),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_collapse_reduces_to_target_and_logs() {
        let (mut graph, mut collapser, calc) = init(&make_plane_grid(3));
        let performed = collapser
            .collapse_to(&mut graph, &calc, 4, NEVER_COLLAPSE_COST, &CancelToken::new())
            .unwrap();
        assert_eq!(performed, 5);
        assert_eq!(collapser.vertex_count(), 4);
        assert_eq!(collapser.collapse_log().len(), 5);
        for record in collapser.collapse_log() {
            assert_ne!(record.src, record.dst);
            assert!(!record.removed_triangles.is_empty());
        }
    }

    #[test]
    fn test_no_self_edges_and_no_stale_references_after_collapsing() {
        let (mut graph, mut collapser, calc) = init(&make_plane_grid(4));
        collapser
            .collapse_to(&mut graph, &calc, 5, NEVER_COLLAPSE_COST, &CancelToken::new())
            .unwrap();
        for v in graph.vertex_ids() {
            for edge in &graph.vertex(v).edges {
                assert_ne!(edge.dst, v, "vertex {} holds an edge to itself", v.0);
                // A collapsed vertex is fully detached, nothing may point
                // at it
                assert!(!graph.vertex(edge.dst).edges.is_empty());
            }
            for &t in &graph.vertex(v).triangles {
                assert!(!graph.triangle(t).removed);
            }
        }
    }

    #[test]
    fn test_never_collapse_costs_halt_before_target() {
        let mesh = make_tetrahedron();
        let mut graph = MeshGraph::build(&mesh).unwrap();
        let mut collapser = Collapser::new(&graph);
        let mut calc = OutsideCost::new(
            Box::new(CurvatureCost::new(false, false)),
            NEVER_COLLAPSE_COST,
            FRAC_PI_2,
        );
        collapser.init_collapse_costs(&mut graph, &mut calc).unwrap();

        // Every tetrahedron vertex is outside, so every cost is pinned at
        // the never-collapse sentinel
        let performed = collapser
            .collapse_to(&mut graph, &calc, 1, NEVER_COLLAPSE_COST, &CancelToken::new())
            .unwrap();
        assert_eq!(performed, 0);
        assert_eq!(collapser.vertex_count(), 4);
    }

    #[test]
    fn test_cost_limit_halts_collapsing() {
        let (mut graph, mut collapser, calc) = init(&make_plane_grid(3));
        // A zero cost limit admits nothing
        let performed = collapser
            .collapse_to(&mut graph, &calc, 0, 0.0, &CancelToken::new())
            .unwrap();
        assert_eq!(performed, 0);
        assert_eq!(collapser.vertex_count(), 9);
    }

    #[test]
    fn test_cancel_between_steps() {
        let (mut graph, mut collapser, calc) = init(&make_plane_grid(3));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            collapser.collapse_to(&mut graph, &calc, 1, NEVER_COLLAPSE_COST, &cancel),
            Err(Error::Cancelled)
        ));
        assert_eq!(collapser.vertex_count(), 9);
    }

    #[test]
    fn test_collapse_order_is_deterministic() {
        let run = || {
            let (mut graph, mut collapser, calc) = init(&make_plane_grid(4));
            collapser
                .collapse_to(&mut graph, &calc, 4, NEVER_COLLAPSE_COST, &CancelToken::new())
                .unwrap();
            collapser.collapse_log.clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_collapsed_vertex_is_detached() {
        let (mut graph, mut collapser, calc) = init(&make_plane_grid(3));
        collapser
            .collapse_step(&mut graph, &calc)
            .unwrap();
        let record = collapser.collapse_log().last().unwrap().clone();
        let src = VertexId(record.src);
        assert!(graph.vertex(src).edges.is_empty());
        assert!(graph.vertex(src).triangles.is_empty());
        for &t in &record.removed_triangles {
            assert!(graph.triangle(TriangleId(t)).removed);
        }
    }
}
