// ============================================================================
// Network options
//
// Everything the surrounding application chooses before a network is built:
// physical scalars, which reaction kinds are generated, and how composition
// space is grouped into super-clusters.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::composition::AmountType;
use crate::error::{NetworkError, Result};
use crate::math::DEFAULT_DISLOCATION_DENSITY;

/// Which reaction kinds the generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionToggles {
    /// Production and dissociation.
    pub standard: bool,
    pub re_solution: bool,
    /// Generic sink for single point defects.
    pub sink: bool,
    pub dislocation_sink: bool,
    pub grain_boundary_sink: bool,
    pub trap_mutation: bool,
    /// Externally rated reactions between every pair of clusters.
    pub constant: bool,
    /// Keep only the entries coupling a cluster to itself.
    pub reduced_jacobian: bool,
}

impl Default for ReactionToggles {
    fn default() -> Self {
        Self {
            standard: true,
            re_solution: false,
            sink: false,
            dislocation_sink: false,
            grain_boundary_sink: false,
            trap_mutation: false,
            constant: false,
            reduced_jacobian: false,
        }
    }
}

/// Super-cluster layout: above `min` on a groupable axis, tiles are
/// `widths[axis]` amounts wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingParams {
    pub min: AmountType,
    pub widths: Vec<AmountType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Overrides the material's lattice parameter (nm).
    pub lattice_parameter: Option<f64>,
    /// Overrides the material's impurity radius (nm).
    pub impurity_radius: Option<f64>,
    pub interstitial_bias: f64,
    /// Fissions per nm^3 per second.
    pub fission_rate: f64,
    /// Electronic stopping power fraction used by re-solution fits.
    pub zeta: f64,
    /// Asymptotic He per V ratio of tungsten bubbles.
    pub hev_ratio: f64,
    /// Temperature set on every grid point at build time (K).
    pub temperature: f64,
    pub dislocation_density: f64,
    /// Grain size for grain-boundary sinks (nm).
    pub grain_size: f64,
    /// Trap-mutation rate as a multiple of the largest network rate.
    pub trap_mutation_factor: f64,
    pub grouping: Option<GroupingParams>,
    pub reactions: ReactionToggles,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            lattice_parameter: None,
            impurity_radius: None,
            interstitial_bias: 1.15,
            fission_rate: 0.0,
            zeta: 0.73,
            hev_ratio: 4.0,
            temperature: 933.0,
            dislocation_density: DEFAULT_DISLOCATION_DENSITY,
            grain_size: 50_000.0,
            trap_mutation_factor: 1.0e6,
            grouping: None,
            reactions: ReactionToggles::default(),
        }
    }
}

impl NetworkOptions {
    /// Reject values that would make rate laws meaningless.
    pub fn validate(&self, num_species: usize) -> Result<()> {
        if let Some(a) = self.lattice_parameter {
            if !(a > 0.0) {
                return Err(invalid("lattice_parameter", format!("must be positive, got {a}")));
            }
        }
        if let Some(r) = self.impurity_radius {
            if !(r > 0.0) {
                return Err(invalid("impurity_radius", format!("must be positive, got {r}")));
            }
        }
        if self.fission_rate < 0.0 {
            return Err(invalid("fission_rate", "must not be negative".into()));
        }
        if !(self.dislocation_density > 0.0) {
            return Err(invalid("dislocation_density", "must be positive".into()));
        }
        if !(self.grain_size > 0.0) {
            return Err(invalid("grain_size", "must be positive".into()));
        }
        if !(self.hev_ratio > 0.0) {
            return Err(invalid("hev_ratio", "must be positive".into()));
        }
        if self.temperature < 0.0 {
            return Err(invalid("temperature", "must not be negative".into()));
        }
        if let Some(g) = &self.grouping {
            if g.widths.len() != num_species {
                return Err(invalid(
                    "grouping.widths",
                    format!("expected {num_species} widths, got {}", g.widths.len()),
                ));
            }
            if g.widths.iter().any(|&w| w == 0) {
                return Err(invalid("grouping.widths", "widths must be at least 1".into()));
            }
        }
        Ok(())
    }

    /// Grouping width for an axis, 1 when grouping is off.
    pub fn grouping_width(&self, axis: usize) -> AmountType {
        self.grouping
            .as_ref()
            .and_then(|g| g.widths.get(axis).copied())
            .unwrap_or(1)
    }

    /// Amount above which grouping starts, `AmountType::MAX` when off.
    pub fn grouping_min(&self) -> AmountType {
        self.grouping.as_ref().map(|g| g.min).unwrap_or(AmountType::MAX)
    }
}

fn invalid(name: &'static str, reason: String) -> NetworkError {
    NetworkError::InvalidOption { name, reason }
}
