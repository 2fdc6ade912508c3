//! Compressed Sparse Row (CSR) sparsity pattern of the network Jacobian.
//!
//! Built in parallel with the count / offset / claim-slot protocol: every
//! declaring item first bumps an atomic counter for each row it touches,
//! the counters become a row map, then items claim the first free slot of
//! the row by compare-and-swap (skipping columns already present), and the
//! rows are compacted and sorted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::composition::INVALID_INDEX;

/// Row -> sorted columns, as handed to the solver.
pub type SparseFillMap = BTreeMap<usize, Vec<usize>>;

/// CSR pattern over degrees of freedom. Every row holds its diagonal.
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    row_map: Vec<usize>,
    entries: Vec<usize>,
}

impl Connectivity {
    /// Diagonal-only pattern.
    pub fn diagonal(num_rows: usize) -> Self {
        Self { row_map: (0..=num_rows).collect(), entries: (0..num_rows).collect() }
    }

    /// Build from the (row, col) pairs each item declares through `visit`.
    /// Duplicate pairs collapse to one entry.
    pub fn build<T, F>(num_rows: usize, items: &[T], visit: F) -> Self
    where
        T: Sync,
        F: Fn(&T, &mut dyn FnMut(usize, usize)) + Sync,
    {
        // Pass 1: upper bound of entries per row, diagonal included.
        let counts: Vec<AtomicUsize> = (0..num_rows).map(|_| AtomicUsize::new(1)).collect();
        items.par_iter().for_each(|item| {
            visit(item, &mut |row, _col| {
                counts[row].fetch_add(1, Ordering::Relaxed);
            });
        });

        let mut row_map = Vec::with_capacity(num_rows + 1);
        row_map.push(0);
        for c in &counts {
            let last = row_map[row_map.len() - 1];
            row_map.push(last + c.load(Ordering::Relaxed));
        }

        // Pass 2: claim slots.
        let total = row_map[num_rows];
        let slots: Vec<AtomicUsize> = (0..total).map(|_| AtomicUsize::new(INVALID_INDEX)).collect();
        (0..num_rows).into_par_iter().for_each(|row| {
            slots[row_map[row]].store(row, Ordering::Relaxed);
        });
        items.par_iter().for_each(|item| {
            visit(item, &mut |row, col| claim_slot(&slots[row_map[row]..row_map[row + 1]], col));
        });

        // Compaction.
        let rows: Vec<Vec<usize>> = (0..num_rows)
            .into_par_iter()
            .map(|row| {
                let mut cols: Vec<usize> = slots[row_map[row]..row_map[row + 1]]
                    .iter()
                    .map(|s| s.load(Ordering::Relaxed))
                    .filter(|&c| c != INVALID_INDEX)
                    .collect();
                cols.sort_unstable();
                cols
            })
            .collect();
        Self::from_rows(&rows)
    }

    pub fn from_rows(rows: &[Vec<usize>]) -> Self {
        let total: usize = rows.iter().map(|r| r.len()).sum();
        let mut row_map = Vec::with_capacity(rows.len() + 1);
        let mut entries = Vec::with_capacity(total);
        let mut offset = 0;
        for cols in rows {
            row_map.push(offset);
            entries.extend_from_slice(cols);
            offset += cols.len();
        }
        row_map.push(offset);
        Self { row_map, entries }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.row_map.len().saturating_sub(1)
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.entries[self.row_map[row]..self.row_map[row + 1]]
    }

    pub fn row_map(&self) -> &[usize] {
        &self.row_map
    }

    pub fn entries(&self) -> &[usize] {
        &self.entries
    }

    /// Position of `(row, col)` in the values array.
    pub fn offset(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.num_rows() {
            return None;
        }
        self.row(row).binary_search(&col).ok().map(|i| self.row_map[row] + i)
    }

    pub fn fill_map(&self) -> SparseFillMap {
        (0..self.num_rows()).map(|r| (r, self.row(r).to_vec())).collect()
    }

    pub fn memory_bytes(&self) -> usize {
        (self.row_map.len() + self.entries.len()) * std::mem::size_of::<usize>()
    }
}

/// Write `col` into the first free slot unless it is already there.
fn claim_slot(row: &[AtomicUsize], col: usize) {
    for slot in row {
        match slot.compare_exchange(INVALID_INDEX, col, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(existing) if existing == col => return,
            Err(_) => continue,
        }
    }
}
