//! Aggregate quantities over the whole network at one grid point.
//!
//! Grouped clusters are expanded slice by slice along the queried axis using
//! the first-order reconstruction; deviations on the other axes sum to zero
//! over the region, so each slice of amount `n` carries
//! `volume / width * (l0 + l1 (n - mean) / dispersion)`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterData;
use crate::composition::{AmountType, INVALID_INDEX};
use crate::math::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TotalKind {
    /// Number density of clusters holding the species.
    Concentration,
    /// Number density of atoms of the species.
    Atom,
    /// Concentration-weighted reaction radius.
    Radius,
    /// Volume fraction occupied by the clusters.
    VolumeFraction,
    /// Atoms of the species sitting in vacancy clusters.
    Trapped,
}

/// One requested total: a kind, a species axis and the smallest amount on
/// that axis that counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalQuantity {
    pub kind: TotalKind,
    pub axis: usize,
    pub min_size: AmountType,
}

impl TotalQuantity {
    pub fn new(kind: TotalKind, axis: usize, min_size: AmountType) -> Self {
        Self { kind, axis, min_size }
    }
}

/// Evaluate one total. `vacancy_axis` selects the trapping clusters.
pub fn compute_total(data: &ClusterData, concentrations: &[f64], q: &TotalQuantity, vacancy_axis: Option<usize>) -> f64 {
    if q.kind == TotalKind::Trapped && vacancy_axis.is_none() {
        return 0.0;
    }
    (0..data.num_clusters)
        .into_par_iter()
        .map(|id| {
            let region = &data.regions[id];
            if q.axis >= region.dim() {
                return 0.0;
            }
            if q.kind == TotalKind::Trapped {
                if let Some(v) = vacancy_axis {
                    if region[v].begin == 0 || v == q.axis {
                        return 0.0;
                    }
                }
            }
            let iv = region[q.axis];
            let first = iv.begin.max(q.min_size).max(1);
            if first >= iv.end {
                return 0.0;
            }
            let l0 = concentrations[id];
            let moment = data.moment_ids[id][q.axis];
            let l1 = if moment == INVALID_INDEX { 0.0 } else { concentrations[moment] };
            let (mean, dispersion) = (iv.mean(), iv.dispersion());
            let slice_volume = region.volume() / iv.length() as f64;
            let radius = data.reaction_radius[id];

            (first..iv.end)
                .map(|n| {
                    let c = slice_volume * (l0 + l1 * (n as f64 - mean) / dispersion);
                    match q.kind {
                        TotalKind::Concentration => c,
                        TotalKind::Atom | TotalKind::Trapped => c * n as f64,
                        TotalKind::Radius => c * radius,
                        TotalKind::VolumeFraction => c * 4.0 / 3.0 * PI * radius.powi(3),
                    }
                })
                .sum::<f64>()
        })
        .sum()
}
