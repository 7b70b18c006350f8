//! LOD generation configuration

use crate::error::{Error, Result};
use crate::point::Point3f;
use serde::{Deserialize, Serialize};

/// How the per-level reduction targets are derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReductionMethod {
    /// Each level removes `step` more unique vertices than the one before
    ConstantVertexCount { levels: u16, step: usize },
    /// Each level removes a further `ratio` of the original unique vertices
    ConstantReductionRatio { levels: u16, ratio: f32 },
    /// Explicit per-level targets, least reduced first
    CustomLevels(Vec<LodTarget>),
}

/// Reduction target for a single LOD level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LodTarget {
    /// Keep at most this many unique vertices
    VertexCount(usize),
    /// Remove this fraction of the original unique vertices (0.0..=1.0)
    ReductionRatio(f32),
    /// Collapse while the cheapest remaining edge costs no more than this
    CollapseCostLimit(f32),
}

/// Which collapse cost calculator drives the simplification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostCalculatorKind {
    /// Curvature-based geometric error
    #[default]
    Default,
    /// Default cost biased against collapsing silhouette-visible vertices
    OutsideWeighted,
    /// Default cost with profile overrides and locked open borders
    ProfileBoundary,
    /// Outside weighting and profile/boundary handling combined
    Combined,
}

/// Pins the collapse cost of one directed edge, identified by position
///
/// Positions are matched against the unified graph vertices, so they must
/// coincide with input vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfiledEdge {
    pub src: Point3f,
    pub dst: Point3f,
    pub cost: f32,
}

/// Full configuration for one LOD generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodConfig {
    pub method: ReductionMethod,
    pub calculator: CostCalculatorKind,
    /// Cost multiplier bias for edges touching outside-marked vertices.
    /// [`crate::NEVER_COLLAPSE_COST`] forbids those collapses entirely.
    /// Zero is invalid.
    pub outside_weight: f32,
    /// Angle in radians between a surface triangle and a hull triangle up
    /// to which outside marking keeps walking (0 = only parallel faces)
    pub outside_walk_angle: f32,
    /// Reject collapses that would flip a surviving triangle's facing
    pub preserve_boundary_edges: bool,
    /// Include per-vertex normal deviation in the cost when the input
    /// carries normals
    pub use_vertex_normals: bool,
    /// Per-edge cost overrides for the profile/boundary calculators
    pub profile: Vec<ProfiledEdge>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            method: ReductionMethod::ConstantReductionRatio {
                levels: 3,
                ratio: 0.25,
            },
            calculator: CostCalculatorKind::Default,
            outside_weight: 1.0,
            outside_walk_angle: std::f32::consts::FRAC_PI_2,
            preserve_boundary_edges: true,
            use_vertex_normals: true,
            profile: Vec::new(),
        }
    }
}

impl LodConfig {
    /// Check the configuration before any work is queued or started
    pub fn validate(&self) -> Result<()> {
        match &self.method {
            ReductionMethod::ConstantVertexCount { levels, step } => {
                if *levels == 0 {
                    return Err(Error::InvalidConfig(
                        "reduction needs at least one level".to_string(),
                    ));
                }
                if *step == 0 {
                    return Err(Error::InvalidConfig(
                        "constant vertex count step must be at least 1".to_string(),
                    ));
                }
            }
            ReductionMethod::ConstantReductionRatio { levels, ratio } => {
                if *levels == 0 {
                    return Err(Error::InvalidConfig(
                        "reduction needs at least one level".to_string(),
                    ));
                }
                if !ratio.is_finite() || *ratio <= 0.0 || *ratio > 1.0 {
                    return Err(Error::InvalidConfig(format!(
                        "reduction ratio {} is outside (0, 1]",
                        ratio
                    )));
                }
            }
            ReductionMethod::CustomLevels(targets) => {
                if targets.is_empty() {
                    return Err(Error::InvalidConfig(
                        "custom level list is empty".to_string(),
                    ));
                }
                for target in targets {
                    Self::validate_target(target)?;
                }
            }
        }

        if self.uses_outside_marking() {
            if self.outside_weight.is_nan() || self.outside_weight == 0.0 {
                return Err(Error::InvalidConfig(
                    "outside weight must be non-zero".to_string(),
                ));
            }
            if !self.outside_walk_angle.is_finite()
                || self.outside_walk_angle < 0.0
                || self.outside_walk_angle > std::f32::consts::PI
            {
                return Err(Error::InvalidConfig(format!(
                    "outside walk angle {} is outside [0, pi]",
                    self.outside_walk_angle
                )));
            }
        }

        if self.uses_profile() {
            for edge in &self.profile {
                if edge.cost.is_nan() || edge.cost < 0.0 {
                    return Err(Error::InvalidConfig(format!(
                        "profiled edge cost {} is negative or NaN",
                        edge.cost
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether the configured calculator runs outside marking
    pub fn uses_outside_marking(&self) -> bool {
        matches!(
            self.calculator,
            CostCalculatorKind::OutsideWeighted | CostCalculatorKind::Combined
        )
    }

    /// Whether the configured calculator consumes the edge profile
    pub fn uses_profile(&self) -> bool {
        matches!(
            self.calculator,
            CostCalculatorKind::ProfileBoundary | CostCalculatorKind::Combined
        )
    }
}

impl LodConfig {
    fn validate_target(target: &LodTarget) -> Result<()> {
        match target {
            LodTarget::VertexCount(_) => Ok(()),
            LodTarget::ReductionRatio(ratio) => {
                if !ratio.is_finite() || *ratio < 0.0 || *ratio > 1.0 {
                    Err(Error::InvalidConfig(format!(
                        "level reduction ratio {} is outside [0, 1]",
                        ratio
                    )))
                } else {
                    Ok(())
                }
            }
            LodTarget::CollapseCostLimit(limit) => {
                if limit.is_nan() || *limit < 0.0 {
                    Err(Error::InvalidConfig(format!(
                        "collapse cost limit {} is negative or NaN",
                        limit
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LodConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_outside_weight_rejected() {
        let config = LodConfig {
            calculator: CostCalculatorKind::OutsideWeighted,
            outside_weight: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::Error::InvalidConfig(_))
        ));

        // Only relevant when the calculator actually marks outside vertices
        let config = LodConfig {
            calculator: CostCalculatorKind::Default,
            outside_weight: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ratio_bounds() {
        let mut config = LodConfig {
            method: ReductionMethod::ConstantReductionRatio {
                levels: 2,
                ratio: 0.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.method = ReductionMethod::ConstantReductionRatio {
            levels: 2,
            ratio: 1.5,
        };
        assert!(config.validate().is_err());

        config.method = ReductionMethod::ConstantReductionRatio {
            levels: 2,
            ratio: 0.5,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_levels_validated() {
        let config = LodConfig {
            method: ReductionMethod::CustomLevels(vec![]),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LodConfig {
            method: ReductionMethod::CustomLevels(vec![
                LodTarget::ReductionRatio(0.0),
                LodTarget::VertexCount(10),
                LodTarget::CollapseCostLimit(0.25),
            ]),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = LodConfig {
            method: ReductionMethod::CustomLevels(vec![LodTarget::CollapseCostLimit(-1.0)]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_walk_angle_bounds() {
        let config = LodConfig {
            calculator: CostCalculatorKind::Combined,
            outside_walk_angle: 4.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
