//! Overlap and moment coefficients of a pair reaction `A + B <-> C`.
//!
//! For every admissible elementary pair `(a, b)` (whose product
//! `p = a + b + shift` lies inside C) the flux carries terms of the form
//! `da^i db^j dp^l`, where `d*` are deviations from the region means. Since
//! admissibility factorizes over axes, a multi-axis sum is the product of
//! per-axis sums, so only a small table per axis is stored.

use crate::composition::{Region, MAX_SPECIES};

/// Highest power of a single deviation that appears in a flux term.
const MAX_POWER: usize = 3;

/// Per-axis amount shift applied to `a + b` (annihilation of vacancies by
/// interstitials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Shift(pub [i32; MAX_SPECIES]);

impl Shift {
    pub const NONE: Shift = Shift([0; MAX_SPECIES]);

    /// Remove `amount` from each of the given axes.
    pub fn annihilate(axes: &[usize], amount: u32) -> Self {
        let mut s = [0; MAX_SPECIES];
        for &k in axes {
            s[k] = -(amount as i32);
        }
        Shift(s)
    }

    #[inline]
    pub fn get(&self, axis: usize) -> i64 {
        self.0[axis] as i64
    }
}

/// Exponents of (da, db, dp) on each axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Powers {
    pub a: [u8; MAX_SPECIES],
    pub b: [u8; MAX_SPECIES],
    pub p: [u8; MAX_SPECIES],
}

type AxisTable = [[[f64; MAX_POWER]; MAX_POWER]; MAX_POWER];

/// Per-axis sums of deviation monomials over admissible pairs.
#[derive(Debug, Clone)]
pub struct PairOverlap {
    tables: [AxisTable; MAX_SPECIES],
    dim: usize,
}

impl PairOverlap {
    /// `product = None` admits every pair (nothing is produced).
    pub fn compute(a: &Region, b: &Region, product: Option<&Region>, shift: &Shift) -> Self {
        let dim = a.dim();
        let mut tables = [[[[0.0; MAX_POWER]; MAX_POWER]; MAX_POWER]; MAX_SPECIES];
        for k in 0..dim {
            let (ia, ib) = (a[k], b[k]);
            let (ma, mb) = (ia.mean(), ib.mean());
            let mp = product.map_or(0.0, |c| c[k].mean());
            let table = &mut tables[k];
            for x in ia.begin..ia.end {
                for y in ib.begin..ib.end {
                    let p = x as i64 + y as i64 + shift.get(k);
                    let dp = match product {
                        Some(c) => {
                            if p < 0 || !c[k].contains(p as u32) {
                                continue;
                            }
                            p as f64 - mp
                        }
                        None => 0.0,
                    };
                    let da = x as f64 - ma;
                    let db = y as f64 - mb;
                    let pa = [1.0, da, da * da];
                    let pb = [1.0, db, db * db];
                    let pp = [1.0, dp, dp * dp];
                    for i in 0..MAX_POWER {
                        for j in 0..MAX_POWER {
                            for l in 0..MAX_POWER {
                                table[i][j][l] += pa[i] * pb[j] * pp[l];
                            }
                        }
                    }
                }
            }
        }
        Self { tables, dim }
    }

    /// Number of admissible elementary pairs.
    pub fn overlap(&self) -> f64 {
        self.coef(&Powers::default())
    }

    /// Sum over admissible pairs of the monomial with the given powers.
    pub fn coef(&self, powers: &Powers) -> f64 {
        let mut value = 1.0;
        for k in 0..self.dim {
            let (i, j, l) = (powers.a[k] as usize, powers.b[k] as usize, powers.p[k] as usize);
            if i >= MAX_POWER || j >= MAX_POWER || l >= MAX_POWER {
                return 0.0;
            }
            value *= self.tables[k][i][j][l];
            if value == 0.0 {
                break;
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Interval;
    use approx::assert_relative_eq;

    fn r1(begin: u32, end: u32) -> Region {
        Region::from_intervals(&[Interval::new(begin, end)])
    }

    #[test]
    fn test_simplex_overlap_is_one() {
        let ov = PairOverlap::compute(&r1(1, 2), &r1(1, 2), Some(&r1(2, 3)), &Shift::NONE);
        assert_relative_eq!(ov.overlap(), 1.0);
        let mut p = Powers::default();
        p.a[0] = 1;
        assert_relative_eq!(ov.coef(&p), 0.0);
    }

    #[test]
    fn test_group_overlap_counts_pairs() {
        // A = {1}, B = [10, 14), C = [12, 16): pairs b in {11, 12, 13}.
        let ov = PairOverlap::compute(&r1(1, 2), &r1(10, 14), Some(&r1(12, 16)), &Shift::NONE);
        assert_relative_eq!(ov.overlap(), 3.0);
        // sum of db = (11 + 12 + 13) - 3 * 11.5
        let mut p = Powers::default();
        p.b[0] = 1;
        assert_relative_eq!(ov.coef(&p), 36.0 - 34.5);
        // sum of dp, products 12, 13, 14 around 13.5
        let mut p = Powers::default();
        p.p[0] = 1;
        assert_relative_eq!(ov.coef(&p), 39.0 - 40.5);
    }

    #[test]
    fn test_shift_and_no_product() {
        let a = Region::from_intervals(&[Interval::single(0), Interval::new(5, 9)]);
        let b = Region::from_intervals(&[Interval::single(2), Interval::single(0)]);
        let shift = Shift::annihilate(&[0, 1], 2);
        let c = Region::from_intervals(&[Interval::single(0), Interval::new(3, 5)]);
        let ov = PairOverlap::compute(&a, &b, Some(&c), &shift);
        // V axis: a in [5, 9), minus 2 -> [3, 7) overlaps [3, 5) twice.
        assert_relative_eq!(ov.overlap(), 2.0);
        let all = PairOverlap::compute(&a, &b, None, &Shift::NONE);
        assert_relative_eq!(all.overlap(), 4.0);
    }
}
