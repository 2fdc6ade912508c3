//! Externally rated linear coupling `dc_row/dt += k * c_col`, used when a
//! network is split into sub-networks and the coupling to the rest is
//! frozen over a time step.

use crate::composition::IndexType;
use crate::compute::AtomicBuffer;

use super::EntryBlock;

#[derive(Debug, Clone)]
pub struct ConstantReaction {
    row: IndexType,
    col: IndexType,
    pub(crate) rate: Vec<f64>,
    pub(crate) block: EntryBlock,
}

impl ConstantReaction {
    pub fn new(row: IndexType, col: IndexType, grid_size: usize) -> Self {
        Self { row, col, rate: vec![0.0; grid_size], block: EntryBlock::new(vec![row], vec![col]) }
    }

    pub fn row(&self) -> IndexType {
        self.row
    }

    pub fn col(&self) -> IndexType {
        self.col
    }

    pub fn set_rate(&mut self, grid_index: usize, rate: f64) {
        self.rate[grid_index] = rate;
    }

    pub fn compute_flux(&self, concentrations: &[f64], fluxes: &AtomicBuffer, grid_index: usize) {
        fluxes.add(self.row, self.rate[grid_index] * concentrations[self.col]);
    }

    pub fn compute_partials(&self, values: &AtomicBuffer, grid_index: usize) {
        self.block.add(values, 0, 0, self.rate[grid_index]);
    }
}
