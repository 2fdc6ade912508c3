//! Plasma-surface interaction in tungsten: helium, deuterium, tritium,
//! vacancies and self-interstitials.
//!
//! Mixed clusters always hold vacancies; the amount of gas a vacancy cluster
//! can hold is capped by [`max_he_per_v`]. Interstitial clusters are pure and
//! never grouped.

use log::{debug, warn};

use crate::cluster::MaterialScalars;
use crate::composition::{AmountType, Composition, IndexType, Region, INVALID_INDEX, MAX_SPECIES};
use crate::config::NetworkOptions;
use crate::generator::{GeneratorContext, ReactionEmitter};
use crate::math::{HELIUM_RADIUS, PI, TUNGSTEN_LATTICE_CONSTANT};
use crate::reaction::{ClusterSet, ReactionKind, Shift};
use crate::species::Species;
use crate::subpaving::RefinementDetector;

use super::{emit_annihilation, emit_standard, representative, Coverage, Material};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsiSpecies {
    He,
    D,
    T,
    V,
    I,
}

impl Species for PsiSpecies {
    const ALL: &'static [Self] = &[PsiSpecies::He, PsiSpecies::D, PsiSpecies::T, PsiSpecies::V, PsiSpecies::I];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            PsiSpecies::He => "He",
            PsiSpecies::D => "D",
            PsiSpecies::T => "T",
            PsiSpecies::V => "V",
            PsiSpecies::I => "I",
        }
    }

    fn name(self) -> &'static str {
        match self {
            PsiSpecies::He => "Helium",
            PsiSpecies::D => "Deuterium",
            PsiSpecies::T => "Tritium",
            PsiSpecies::V => "Vacancy",
            PsiSpecies::I => "Interstitial",
        }
    }

    fn is_vacancy(self) -> bool {
        self == PsiSpecies::V
    }

    fn is_interstitial(self) -> bool {
        self == PsiSpecies::I
    }
}

const HE: usize = 0;
const D: usize = 1;
const T: usize = 2;
const V: usize = 3;
const I: usize = 4;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

const MAX_HE_PER_V: [AmountType; 30] = [
    0, 9, 14, 18, 20, 27, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80, 85, 90, 95, 98, 100, 101, 103, 105, 107, 109,
    110, 112, 116,
];

/// Most helium a vacancy cluster of size `v` can hold.
pub fn max_he_per_v(v: AmountType, ratio: f64) -> AmountType {
    if let Some(&m) = MAX_HE_PER_V.get(v as usize) {
        return m;
    }
    let last = MAX_HE_PER_V[MAX_HE_PER_V.len() - 1];
    let tail = last + v - MAX_HE_PER_V.len() as AmountType + 1;
    ((ratio * v as f64) as AmountType).max(tail)
}

/// Hydrogen isotopes fill at most two thirds of the helium capacity.
fn max_hydrogen_per_v(v: AmountType, ratio: f64) -> f64 {
    2.0 / 3.0 * max_he_per_v(v, ratio) as f64
}

const HE_FORMATION: [f64; 9] = [f64::INFINITY, 6.15, 11.44, 16.35, 21.0, 26.1, 30.24, 34.93, 38.80];
const I_FORMATION: [f64; 7] = [f64::INFINITY, 10.0, 18.5, 27.0, 35.0, 42.5, 48.0];

const HE_MIGRATION: [f64; 7] = [0.13, 0.20, 0.25, 0.20, 0.12, 0.3, 0.4];
const HE_DIFFUSION: [f64; 7] = [2.9e10, 3.2e10, 2.3e10, 1.7e10, 5.0e10, 1.0e10, 1.0e10];
const I_MIGRATION: [f64; 5] = [0.01, 0.02, 0.03, 0.04, 0.05];
const I_DIFFUSION: [f64; 5] = [8.8e10, 8.0e10, 3.9e10, 2.0e10, 1.0e10];

const V1_MIGRATION: f64 = 1.30;
const V1_DIFFUSION: f64 = 1.8e12;
const D1_MIGRATION: f64 = 0.38;
const D1_DIFFUSION: f64 = 2.83e11;
const T1_MIGRATION: f64 = 0.38;
const T1_DIFFUSION: f64 = 2.31e11;

const HYDROGEN_SOLUTION_ENERGY: f64 = 1.04;
const HYDROGEN_TRAP_ENERGY: f64 = 1.2;
const HE_V_BINDING_SCALE: f64 = 9.2;
const HYDROGEN_RADIUS_FACTOR: f64 = 0.25;

/// Largest interstitial cluster a trap mutation may punch out.
const MAX_TRAP_MUTATION_SIZE: AmountType = 6;

fn he_formation(n: AmountType) -> f64 {
    match HE_FORMATION.get(n as usize) {
        Some(&e) => e,
        None => HE_FORMATION[8] + 4.5 * (n - 8) as f64,
    }
}

fn i_formation(n: AmountType) -> f64 {
    match I_FORMATION.get(n as usize) {
        Some(&e) => e,
        None => I_FORMATION[6] + 6.0 * (n - 6) as f64,
    }
}

fn v_formation(n: AmountType) -> f64 {
    match n {
        0 => 0.0,
        1 => 3.6,
        2 => 7.25,
        _ => 7.25 + 2.6 * ((n as f64).powf(2.0 / 3.0) - 2f64.powf(2.0 / 3.0)),
    }
}

/// Vacancy cluster energy plus a He-V mixing term and a constant trapping
/// gain per hydrogen isotope.
pub fn hev_formation(he: AmountType, h: AmountType, v: AmountType) -> f64 {
    let (n, m) = (he as f64, v as f64);
    let mixing = if he == 0 { 0.0 } else { HE_V_BINDING_SCALE * n * m / (n + m) };
    v_formation(v) + HE_FORMATION[1] * n - mixing + h as f64 * (HYDROGEN_SOLUTION_ENERGY - HYDROGEN_TRAP_ENERGY)
}

/// W(100) surface trap mutation: depth [nm] and punched-out interstitial
/// size for He1..He7.
fn trap_mutation_tables(temperature: f64) -> ([f64; 7], [AmountType; 7]) {
    if temperature < 1066.5 {
        ([-0.1, 0.5, 0.6, 0.6, 0.8, 0.8, 0.8], [0, 1, 1, 1, 1, 2, 2])
    } else {
        ([-0.1, 0.5, 0.6, 0.8, 0.6, 0.8, 0.8], [0, 1, 1, 1, 2, 2, 2])
    }
}

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PsiMaterial {
    max: [AmountType; MAX_SPECIES],
    hev_ratio: f64,
    grouping_min: AmountType,
    widths: [AmountType; MAX_SPECIES],
    trap_depths: [f64; 7],
    trap_sizes: [AmountType; 7],
}

impl PsiMaterial {
    /// Whether a single composition is a physical cluster.
    pub fn is_valid(&self, comp: &Composition) -> bool {
        let a = comp.amounts();
        if a[I] > 0 {
            return a[HE] == 0 && a[D] == 0 && a[T] == 0 && a[V] == 0 && a[I] <= self.max[I];
        }
        if a[V] == 0 {
            let present = [HE, D, T].iter().filter(|&&k| a[k] > 0).count();
            return present == 1 && [HE, D, T].iter().all(|&k| a[k] <= self.max[k]);
        }
        let cap = max_he_per_v(a[V], self.hev_ratio);
        let h_cap = max_hydrogen_per_v(a[V], self.hev_ratio);
        a[V] <= self.max[V]
            && a[HE] + a[D] + a[T] <= cap
            && a[D] as f64 <= h_cap
            && a[T] as f64 <= h_cap
            && (self.max[D] > 0 || a[D] == 0)
            && (self.max[T] > 0 || a[T] == 0)
    }

    fn coverage(&self, region: &Region) -> Coverage {
        let lo = |k: usize| region[k].begin;
        let hi = |k: usize| region[k].last();

        if lo(I) > 0 {
            let can_be_pure = [HE, D, T, V].iter().all(|&k| lo(k) == 0);
            let always_pure = [HE, D, T, V].iter().all(|&k| hi(k) == 0);
            if !can_be_pure || lo(I) > self.max[I] {
                return Coverage::None;
            }
            return if always_pure && hi(I) <= self.max[I] { Coverage::Full } else { Coverage::Partial };
        }
        if hi(I) > 0 || (lo(V) == 0 && hi(V) > 0) {
            return Coverage::Partial;
        }

        if hi(V) == 0 {
            let must = [HE, D, T].iter().filter(|&&k| lo(k) > 0).count();
            let may: Vec<usize> = [HE, D, T].iter().copied().filter(|&k| hi(k) > 0).collect();
            if must >= 2 || may.is_empty() {
                return Coverage::None;
            }
            if must == 1 && may.len() == 1 {
                let k = may[0];
                return if hi(k) <= self.max[k] {
                    Coverage::Full
                } else if lo(k) <= self.max[k] {
                    Coverage::Partial
                } else {
                    Coverage::None
                };
            }
            return Coverage::Partial;
        }

        // Every composition holds vacancies.
        if lo(V) > self.max[V] {
            return Coverage::None;
        }
        let gas_lo = lo(HE) + lo(D) + lo(T);
        let gas_hi = hi(HE) + hi(D) + hi(T);
        let (cap_lo, cap_hi) = (max_he_per_v(lo(V), self.hev_ratio), max_he_per_v(hi(V), self.hev_ratio));
        let (h_lo, h_hi) = (max_hydrogen_per_v(lo(V), self.hev_ratio), max_hydrogen_per_v(hi(V), self.hev_ratio));
        let no_d = self.max[D] == 0 && lo(D) > 0;
        let no_t = self.max[T] == 0 && lo(T) > 0;
        if gas_lo > cap_hi || lo(D) as f64 > h_hi || lo(T) as f64 > h_hi || no_d || no_t {
            return Coverage::None;
        }
        let full = hi(V) <= self.max[V]
            && gas_hi <= cap_lo
            && hi(D) as f64 <= h_lo
            && hi(T) as f64 <= h_lo
            && (self.max[D] > 0 || hi(D) == 0)
            && (self.max[T] > 0 || hi(T) == 0);
        if full {
            Coverage::Full
        } else {
            Coverage::Partial
        }
    }

    /// He_n on its own axis, 1 <= n <= 7.
    fn trap_mutation_source(region: &Region) -> Option<AmountType> {
        if !region.is_simplex() {
            return None;
        }
        let comp = region.origin();
        let n = comp[HE];
        (comp.is_on_axis(HE) && (1..=7).contains(&n)).then_some(n)
    }

    fn emit_single<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, id: IndexType, emitter: &E) {
        let region = ctx.region(id);
        if !region.is_simplex() {
            return;
        }
        let comp = region.origin();
        if comp.total() == 1 && (comp.is_on_axis(V) || comp.is_on_axis(I)) {
            emitter.emit(ReactionKind::Sink, ClusterSet::single(id));
            emitter.emit(ReactionKind::DislocationSink, ClusterSet::single(id));
            emitter.emit(ReactionKind::GrainBoundarySink, ClusterSet::single(id));
        }

        let Some(n) = Self::trap_mutation_source(region) else { return };
        let size = self.trap_sizes[n as usize - 1];
        if size == 0 {
            return;
        }
        for m in size..=MAX_TRAP_MUTATION_SIZE {
            let mut hev = Composition::on_axis(MAX_SPECIES, HE, n);
            hev[V] = m;
            let hev_id = ctx.find_cluster(&hev);
            let int_id = ctx.find_cluster(&Composition::on_axis(MAX_SPECIES, I, m));
            if hev_id == INVALID_INDEX || int_id == INVALID_INDEX {
                continue;
            }
            if m != size {
                debug!("He{n} trap mutation falls back to I{m}");
            }
            let shift = Shift::annihilate(&[V, I], m);
            emitter.emit(ReactionKind::TrapMutation, ClusterSet::new(id, hev_id, int_id).with_shift(shift));
            return;
        }
        warn!("no trap mutation product for He{n}: network lacks He{n}V{size} or I{size}");
    }
}

impl RefinementDetector for PsiMaterial {
    fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
        let small = region[V].last() == 0 || (region[V].begin < self.grouping_min && region[HE].begin < self.grouping_min);
        self.coverage(region).refine(region, &self.widths, small, flags)
    }

    fn select(&self, region: &Region) -> bool {
        self.coverage(region) == Coverage::Full
    }
}

impl Material for PsiMaterial {
    type Species = PsiSpecies;

    const NAME: &'static str = "PSI";

    fn new(max_amounts: &[AmountType], options: &NetworkOptions) -> Self {
        let mut max = [0; MAX_SPECIES];
        for (m, &a) in max.iter_mut().zip(max_amounts) {
            *m = a;
        }
        let mut widths = [1; MAX_SPECIES];
        for (k, species) in PsiSpecies::ALL.iter().enumerate() {
            if species.groupable() {
                widths[k] = options.grouping_width(k);
            }
        }
        let (trap_depths, trap_sizes) = trap_mutation_tables(options.temperature);
        Self {
            max,
            hev_ratio: options.hev_ratio,
            grouping_min: options.grouping_min(),
            widths,
            trap_depths,
            trap_sizes,
        }
    }

    fn default_lattice_parameter() -> f64 {
        TUNGSTEN_LATTICE_CONSTANT
    }

    fn default_impurity_radius() -> f64 {
        HELIUM_RADIUS
    }

    /// Two atoms per bcc cell.
    fn atomic_volume(lattice_parameter: f64) -> f64 {
        0.5 * lattice_parameter.powi(3)
    }

    fn root_amounts(&self, max_amounts: &[AmountType]) -> Vec<AmountType> {
        let mut root = max_amounts.to_vec();
        if self.max[V] > 0 {
            let cap = max_he_per_v(self.max[V], self.hev_ratio);
            root[HE] = root[HE].max(cap);
            let h_cap = max_hydrogen_per_v(self.max[V], self.hev_ratio) as AmountType;
            for k in [D, T] {
                if self.max[k] > 0 {
                    root[k] = root[k].max(h_cap);
                }
            }
        }
        root
    }

    fn formation_energy(&self, region: &Region) -> f64 {
        let c = representative(region);
        if c[I] > 0 {
            i_formation(c[I])
        } else if c[V] > 0 {
            hev_formation(c[HE], c[D] + c[T], c[V])
        } else if c[HE] > 0 {
            he_formation(c[HE])
        } else {
            HYDROGEN_SOLUTION_ENERGY * (c[D] + c[T]) as f64
        }
    }

    fn migration_energy(&self, region: &Region) -> f64 {
        mobility(region).map_or(f64::INFINITY, |(em, _)| em)
    }

    fn diffusion_factor(&self, region: &Region, _lattice_parameter: f64) -> f64 {
        mobility(region).map_or(0.0, |(_, d0)| d0)
    }

    fn reaction_radius(&self, region: &Region, scalars: &MaterialScalars) -> f64 {
        let a = scalars.lattice_parameter;
        let c = representative(region);
        let base = (3.0 * a.powi(3) / (8.0 * PI)).cbrt();
        let grow = |n: AmountType| (3.0 * a.powi(3) * n as f64 / (8.0 * PI)).cbrt() - base;
        let core = 3f64.sqrt() / 4.0 * a;
        if c[I] > 0 {
            scalars.interstitial_bias * (core + grow(c[I]))
        } else if c[V] > 0 {
            core + grow(c[V])
        } else if c[HE] > 0 {
            scalars.impurity_radius + grow(c[HE])
        } else if c[D] + c[T] > 0 {
            HYDROGEN_RADIUS_FACTOR * (scalars.impurity_radius + grow(c[D] + c[T]))
        } else {
            0.0
        }
    }

    fn generate_pair<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, i: IndexType, j: IndexType, emitter: &E) {
        if i == j {
            self.emit_single(ctx, i, emitter);
        }
        let (ri, rj) = (ctx.region(i), ctx.region(j));
        match (ri[I].begin > 0, rj[I].begin > 0) {
            (true, true) | (false, false) => {
                emit_standard(ctx, i, j, Shift::NONE, true, emitter);
            }
            (true, false) if rj[V].begin > 0 => emit_annihilation(ctx, i, j, j, i, V, I, emitter),
            (false, true) if ri[V].begin > 0 => emit_annihilation(ctx, i, j, i, j, V, I, emitter),
            // Interstitials do not react with vacancy-free gas clusters.
            _ => {}
        }
    }

    fn trap_mutation_depth(&self, region: &Region) -> f64 {
        Self::trap_mutation_source(region).map_or(0.0, |n| self.trap_depths[n as usize - 1])
    }
}

/// (migration energy, diffusion prefactor) of the mobile clusters.
fn mobility(region: &Region) -> Option<(f64, f64)> {
    if !region.is_simplex() {
        return None;
    }
    let c = region.origin();
    let n = c.total() as usize;
    if c.is_on_axis(HE) && n <= HE_MIGRATION.len() {
        Some((HE_MIGRATION[n - 1], HE_DIFFUSION[n - 1]))
    } else if c.is_on_axis(I) && n <= I_MIGRATION.len() {
        Some((I_MIGRATION[n - 1], I_DIFFUSION[n - 1]))
    } else if n != 1 {
        None
    } else if c[V] == 1 {
        Some((V1_MIGRATION, V1_DIFFUSION))
    } else if c[D] == 1 {
        Some((D1_MIGRATION, D1_DIFFUSION))
    } else if c[T] == 1 {
        Some((T1_MIGRATION, T1_DIFFUSION))
    } else {
        None
    }
}
