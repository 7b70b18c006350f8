//! LOD level generation driver
//!
//! Ties the pipeline together: build the mesh graph, price all edges,
//! then walk the configured reduction targets in order, collapsing the
//! graph monotonically and baking an index buffer snapshot per level.

use crate::collapse::Collapser;
use crate::cost::build_calculator;
use crate::graph::MeshGraph;
use meshlod_core::{
    CancelToken, Error, GeneratedLods, LodConfig, LodLevel, LodTarget, MeshBuffers,
    ReductionMethod, Result, NEVER_COLLAPSE_COST,
};

/// One reduction target in collapser terms
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResolvedTarget {
    vertex_target: usize,
    cost_limit: f32,
}

/// Generate all configured LOD levels for a mesh
///
/// Levels are produced in configuration order, which must run from least
/// to most reduced; the collapser only ever moves forward. A level whose
/// target is already met (or unreachable under the cost limit) is marked
/// skipped and repeats the previous level's buffers.
///
/// # Example
///
/// ```
/// use meshlod_core::{LodConfig, MeshBuffers, SubmeshBuffers, Point3f};
/// use meshlod_simplification::generate_lods;
///
/// let mesh = MeshBuffers::from_submeshes(vec![SubmeshBuffers::new(
///     vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(1.0, 0.0, 0.0),
///         Point3f::new(0.5, 1.0, 0.0),
///         Point3f::new(0.5, 0.5, 1.0),
///     ],
///     vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
/// )]);
/// let lods = generate_lods(&mesh, &LodConfig::default()).unwrap();
/// assert_eq!(lods.level_count(), 3);
/// ```
pub fn generate_lods(mesh: &MeshBuffers, config: &LodConfig) -> Result<GeneratedLods> {
    generate_lods_with_cancel(mesh, config, &CancelToken::new())
}

/// Generate LOD levels, checking the token between collapse steps
///
/// Returns [`meshlod_core::Error::Cancelled`] as soon as the token is
/// observed cancelled; the input mesh is never mutated either way.
pub fn generate_lods_with_cancel(
    mesh: &MeshBuffers,
    config: &LodConfig,
    cancel: &CancelToken,
) -> Result<GeneratedLods> {
    config.validate()?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut graph = MeshGraph::build(mesh)?;
    let mut calculator = build_calculator(config);
    let mut collapser = Collapser::new(&graph);
    collapser.init_collapse_costs(&mut graph, calculator.as_mut())?;
    log::debug!(
        "collapse costs initialized: {} unique vertices, {} triangles",
        graph.vertex_count(),
        graph.live_triangle_count()
    );

    let targets = resolve_targets(config, graph.vertex_count());
    let mut lods = GeneratedLods::default();
    let mut last_bake_count = collapser.vertex_count();
    for (i, target) in targets.iter().enumerate() {
        collapser.collapse_to(
            &mut graph,
            calculator.as_ref(),
            target.vertex_target,
            target.cost_limit,
            cancel,
        )?;
        let vertex_count = collapser.vertex_count();
        let skipped = vertex_count == last_bake_count;
        let indices = match (skipped, lods.levels.last()) {
            (true, Some(previous)) => previous.indices.clone(),
            _ => {
                last_bake_count = vertex_count;
                graph.bake_index_buffers()
            }
        };
        log::debug!(
            "level {}: {} unique vertices, {} triangles{}",
            i,
            vertex_count,
            graph.live_triangle_count(),
            if skipped { " (unchanged)" } else { "" }
        );
        lods.levels.push(LodLevel {
            indices,
            collapse_log: collapser.collapse_log().to_vec(),
            unique_vertex_count: vertex_count,
            triangle_count: graph.live_triangle_count(),
            skipped,
        });
    }
    collapser.finish();
    Ok(lods)
}

/// Translate the configured reduction method into per-level collapser
/// targets against the unified vertex count
fn resolve_targets(config: &LodConfig, unique_vertex_count: usize) -> Vec<ResolvedTarget> {
    match &config.method {
        ReductionMethod::ConstantVertexCount { levels, step } => (1..=*levels as usize)
            .map(|k| ResolvedTarget {
                vertex_target: unique_vertex_count.saturating_sub(step.saturating_mul(k)),
                cost_limit: NEVER_COLLAPSE_COST,
            })
            .collect(),
        ReductionMethod::ConstantReductionRatio { levels, ratio } => (1..=*levels as usize)
            .map(|k| {
                let reduction = (ratio * k as f32).min(1.0);
                ResolvedTarget {
                    vertex_target: unique_vertex_count
                        - (unique_vertex_count as f32 * reduction) as usize,
                    cost_limit: NEVER_COLLAPSE_COST,
                }
            })
            .collect(),
        ReductionMethod::CustomLevels(targets) => targets
            .iter()
            .map(|target| match *target {
                LodTarget::VertexCount(count) => ResolvedTarget {
                    vertex_target: count,
                    cost_limit: NEVER_COLLAPSE_COST,
                },
                LodTarget::ReductionRatio(ratio) => ResolvedTarget {
                    vertex_target: unique_vertex_count
                        - (unique_vertex_count as f32 * ratio) as usize,
                    cost_limit: NEVER_COLLAPSE_COST,
                },
                LodTarget::CollapseCostLimit(limit) => ResolvedTarget {
                    vertex_target: 0,
                    cost_limit: limit,
                },
            })
            .collect(),
    }
}
