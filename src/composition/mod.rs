//! Integer compositions and axis-aligned regions of composition space.
//!
//! A `Composition` is a point (amount of each species), a `Region` is a box
//! built from one half-open `Interval` per species axis. Regions whose every
//! interval has length one are simplices and stand for a single cluster.

use serde::{Deserialize, Serialize};

/// Amount of one species in a cluster.
pub type AmountType = u32;

/// Index of a cluster, moment or degree of freedom.
pub type IndexType = usize;

/// Sentinel for "no such cluster / no moment on this axis".
pub const INVALID_INDEX: IndexType = usize::MAX;

/// Largest number of species any material uses.
pub const MAX_SPECIES: usize = 5;

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// Half-open integer interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Interval {
    pub begin: AmountType,
    pub end: AmountType,
}

impl Interval {
    pub fn new(begin: AmountType, end: AmountType) -> Self {
        Self { begin, end: end.max(begin) }
    }

    /// Interval holding exactly one amount.
    pub fn single(amount: AmountType) -> Self {
        Self { begin: amount, end: amount + 1 }
    }

    #[inline]
    pub fn length(&self) -> AmountType {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// Last amount inside the interval (inclusive).
    #[inline]
    pub fn last(&self) -> AmountType {
        self.end.saturating_sub(1).max(self.begin)
    }

    #[inline]
    pub fn contains(&self, amount: AmountType) -> bool {
        amount >= self.begin && amount < self.end
    }

    /// True when the inclusive range `[lo, hi]` overlaps this interval.
    #[inline]
    pub fn overlaps_inclusive(&self, lo: AmountType, hi: AmountType) -> bool {
        !self.is_empty() && lo <= hi && self.begin <= hi && self.last() >= lo
    }

    #[inline]
    pub fn intersects(&self, other: &Interval) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    /// Center of the integer points in the interval.
    #[inline]
    pub fn mean(&self) -> f64 {
        (self.begin as f64 + self.last() as f64) * 0.5
    }

    /// Variance of a uniform distribution over the integer points,
    /// `(w^2 - 1) / 12`. Width-one intervals report 1 so it can be used
    /// as a divisor.
    #[inline]
    pub fn dispersion(&self) -> f64 {
        let w = self.length() as f64;
        if self.length() <= 1 {
            1.0
        } else {
            (w * w - 1.0) / 12.0
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// A point in composition space: one amount per species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Composition {
    amounts: [AmountType; MAX_SPECIES],
    dim: usize,
}

impl Composition {
    pub fn zero(dim: usize) -> Self {
        Self { amounts: [0; MAX_SPECIES], dim: dim.min(MAX_SPECIES) }
    }

    pub fn from_slice(amounts: &[AmountType]) -> Self {
        let mut comp = Self::zero(amounts.len());
        for (k, &a) in amounts.iter().take(MAX_SPECIES).enumerate() {
            comp.amounts[k] = a;
        }
        comp
    }

    /// Composition with a single non-zero coordinate.
    pub fn on_axis(dim: usize, axis: usize, amount: AmountType) -> Self {
        let mut comp = Self::zero(dim);
        if axis < comp.dim {
            comp.amounts[axis] = amount;
        }
        comp
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn amounts(&self) -> &[AmountType] {
        &self.amounts[..self.dim]
    }

    #[inline]
    pub fn get(&self, axis: usize) -> AmountType {
        self.amounts[axis]
    }

    #[inline]
    pub fn set(&mut self, axis: usize, amount: AmountType) {
        self.amounts[axis] = amount;
    }

    /// All coordinates except `axis` are zero.
    pub fn is_on_axis(&self, axis: usize) -> bool {
        self.amounts().iter().enumerate().all(|(k, &a)| k == axis || a == 0)
    }

    pub fn total(&self) -> AmountType {
        self.amounts().iter().sum()
    }
}

impl std::ops::Index<usize> for Composition {
    type Output = AmountType;

    fn index(&self, axis: usize) -> &AmountType {
        &self.amounts[axis]
    }
}

impl std::ops::IndexMut<usize> for Composition {
    fn index_mut(&mut self, axis: usize) -> &mut AmountType {
        &mut self.amounts[axis]
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Axis-aligned box of composition space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    intervals: [Interval; MAX_SPECIES],
    dim: usize,
}

impl Region {
    pub fn from_intervals(intervals: &[Interval]) -> Self {
        let mut all = [Interval::default(); MAX_SPECIES];
        for (k, iv) in intervals.iter().take(MAX_SPECIES).enumerate() {
            all[k] = *iv;
        }
        Self { intervals: all, dim: intervals.len().min(MAX_SPECIES) }
    }

    /// Region containing exactly `comp`.
    pub fn simplex(comp: &Composition) -> Self {
        let ivs: Vec<Interval> = comp.amounts().iter().map(|&a| Interval::single(a)).collect();
        Self::from_intervals(&ivs)
    }

    /// Region from an inclusive lower corner and exclusive upper corner.
    pub fn from_bounds(lo: &Composition, hi_exclusive: &Composition) -> Self {
        let ivs: Vec<Interval> = (0..lo.dim())
            .map(|k| Interval::new(lo[k], hi_exclusive[k]))
            .collect();
        Self::from_intervals(&ivs)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals[..self.dim]
    }

    #[inline]
    pub fn axis(&self, k: usize) -> Interval {
        self.intervals[k]
    }

    pub fn origin(&self) -> Composition {
        let lo: Vec<AmountType> = self.intervals().iter().map(|iv| iv.begin).collect();
        Composition::from_slice(&lo)
    }

    /// Inclusive upper corner.
    pub fn upper_limit_point(&self) -> Composition {
        let hi: Vec<AmountType> = self.intervals().iter().map(|iv| iv.last()).collect();
        Composition::from_slice(&hi)
    }

    pub fn is_simplex(&self) -> bool {
        self.intervals().iter().all(|iv| iv.length() == 1)
    }

    pub fn is_empty(&self) -> bool {
        self.intervals().iter().any(|iv| iv.is_empty())
    }

    /// Number of integer compositions inside the region.
    pub fn volume(&self) -> f64 {
        self.intervals().iter().map(|iv| iv.length() as f64).product()
    }

    pub fn contains(&self, comp: &Composition) -> bool {
        comp.dim() == self.dim
            && self.intervals().iter().enumerate().all(|(k, iv)| iv.contains(comp[k]))
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.dim == other.dim
            && self
                .intervals()
                .iter()
                .zip(other.intervals())
                .all(|(a, b)| a.intersects(b))
    }

    /// Every integer composition of the region, first axis slowest.
    pub fn compositions(&self) -> Vec<Composition> {
        let mut out = Vec::with_capacity(self.volume() as usize);
        if self.is_empty() {
            return out;
        }
        let mut cur = self.origin();
        loop {
            out.push(cur);
            let mut k = self.dim;
            loop {
                if k == 0 {
                    return out;
                }
                k -= 1;
                cur[k] += 1;
                if cur[k] < self.intervals[k].end {
                    break;
                }
                cur[k] = self.intervals[k].begin;
            }
        }
    }
}

impl std::ops::Index<usize> for Region {
    type Output = Interval;

    fn index(&self, axis: usize) -> &Interval {
        &self.intervals[axis]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interval_statistics() {
        let iv = Interval::new(4, 8);
        assert_eq!(iv.length(), 4);
        assert_eq!(iv.last(), 7);
        assert_relative_eq!(iv.mean(), 5.5);
        assert_relative_eq!(iv.dispersion(), 15.0 / 12.0);
        assert_relative_eq!(Interval::single(3).dispersion(), 1.0);
    }

    #[test]
    fn test_inclusive_overlap() {
        let iv = Interval::new(4, 8);
        assert!(iv.overlaps_inclusive(7, 20));
        assert!(iv.overlaps_inclusive(0, 4));
        assert!(!iv.overlaps_inclusive(8, 9));
        assert!(!iv.overlaps_inclusive(5, 4));
    }

    #[test]
    fn test_composition_on_axis() {
        let c = Composition::from_slice(&[0, 3, 0]);
        assert!(c.is_on_axis(1));
        assert!(!c.is_on_axis(0));
        assert_eq!(c.total(), 3);
        assert_eq!(Composition::on_axis(3, 1, 3), c);
    }

    #[test]
    fn test_region_simplex_and_volume() {
        let comp = Composition::from_slice(&[2, 5]);
        let simplex = Region::simplex(&comp);
        assert!(simplex.is_simplex());
        assert_eq!(simplex.origin(), comp);
        assert_relative_eq!(simplex.volume(), 1.0);

        let group = Region::from_intervals(&[Interval::new(0, 4), Interval::new(2, 5)]);
        assert!(!group.is_simplex());
        assert_relative_eq!(group.volume(), 12.0);
        assert_eq!(group.upper_limit_point(), Composition::from_slice(&[3, 4]));
        // Upper bounds are exclusive.
        assert!(!group.contains(&comp));
        assert!(!group.intersects(&simplex));
        let inside = Composition::from_slice(&[2, 4]);
        assert!(group.contains(&inside));
        assert!(group.intersects(&Region::simplex(&inside)));
        assert_eq!(group.compositions().len(), 12);
        assert_eq!(group.compositions()[1], Composition::from_slice(&[0, 3]));
    }
}
