//! Reaction discovery.
//!
//! Every unordered cluster pair `(i, j)` is offered to the material, which
//! emits the reactions the pair takes part in. Discovery runs twice over the
//! same pair loop:
//! 1. Count: tally emissions per (kind, first cluster).
//! 2. Construct: claim the first free slot of the row and write the set.
//!
//! Slots of one first cluster are sorted afterwards, so the final order does
//! not depend on thread scheduling.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;

use crate::cluster::ClusterData;
use crate::composition::{Composition, IndexType, Interval, Region, INVALID_INDEX, MAX_SPECIES};
use crate::config::NetworkOptions;
use crate::material::Material;
use crate::reaction::{ClusterSet, Reaction, ReactionCollection, ReactionKind, Shift};
use crate::subpaving::Subpaving;

// ---------------------------------------------------------------------------
// Context and emitter
// ---------------------------------------------------------------------------

/// What a material sees while deciding the reactions of a pair.
pub struct GeneratorContext<'a> {
    subpaving: &'a Subpaving,
    data: &'a ClusterData,
    options: &'a NetworkOptions,
}

impl<'a> GeneratorContext<'a> {
    pub fn new(subpaving: &'a Subpaving, data: &'a ClusterData, options: &'a NetworkOptions) -> Self {
        Self { subpaving, data, options }
    }

    #[inline]
    pub fn region(&self, id: IndexType) -> &'a Region {
        &self.data.regions[id]
    }

    pub fn data(&self) -> &'a ClusterData {
        self.data
    }

    pub fn options(&self) -> &'a NetworkOptions {
        self.options
    }

    pub fn num_clusters(&self) -> usize {
        self.data.num_clusters
    }

    /// Tile holding `comp`, or `INVALID_INDEX`.
    pub fn find_cluster(&self, comp: &Composition) -> IndexType {
        self.subpaving.find_tile_id(comp)
    }

    #[inline]
    pub fn is_mobile(&self, id: IndexType) -> bool {
        self.data.diffusion_factor[id] > 0.0
    }

    /// Visit every cluster that can receive `a + b + shift` for some
    /// elementary `a` in cluster `i` and `b` in cluster `j`.
    pub fn for_each_product<F: FnMut(IndexType)>(&self, i: IndexType, j: IndexType, shift: &Shift, f: F) {
        let (a, b) = (self.region(i), self.region(j));
        let mut bounds = Vec::with_capacity(a.dim());
        for k in 0..a.dim() {
            let lo = (a[k].begin as i64 + b[k].begin as i64 + shift.get(k)).max(0);
            let hi = a[k].last() as i64 + b[k].last() as i64 + shift.get(k);
            if hi < lo {
                return;
            }
            bounds.push(Interval::new(lo as u32, hi as u32 + 1));
        }
        self.subpaving.for_each_tile_intersecting(&Region::from_intervals(&bounds), f);
    }
}

/// Sink for reactions found by a material.
pub trait ReactionEmitter: Sync {
    fn emit(&self, kind: ReactionKind, set: ClusterSet);
}

fn enabled_kinds(options: &NetworkOptions) -> [bool; ReactionKind::COUNT] {
    let t = &options.reactions;
    let mut enabled = [false; ReactionKind::COUNT];
    for kind in ReactionKind::ALL {
        enabled[kind.index()] = match kind {
            ReactionKind::Production | ReactionKind::Dissociation => t.standard,
            ReactionKind::ReSolution => t.re_solution,
            ReactionKind::TrapMutation => t.trap_mutation,
            ReactionKind::Sink => t.sink,
            ReactionKind::DislocationSink => t.dislocation_sink,
            ReactionKind::GrainBoundarySink => t.grain_boundary_sink,
            ReactionKind::Constant => t.constant,
        };
    }
    enabled
}

// ---------------------------------------------------------------------------
// Count pass
// ---------------------------------------------------------------------------

struct CountEmitter {
    enabled: [bool; ReactionKind::COUNT],
    /// counts[kind][cluster0]
    counts: Vec<Vec<AtomicUsize>>,
}

impl CountEmitter {
    fn new(enabled: [bool; ReactionKind::COUNT], num_clusters: usize) -> Self {
        let counts = (0..ReactionKind::COUNT)
            .map(|_| (0..num_clusters).map(|_| AtomicUsize::new(0)).collect())
            .collect();
        Self { enabled, counts }
    }
}

impl ReactionEmitter for CountEmitter {
    fn emit(&self, kind: ReactionKind, set: ClusterSet) {
        if self.enabled[kind.index()] {
            self.counts[kind.index()][set.cluster0].fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// Construct pass
// ---------------------------------------------------------------------------

/// Cluster set slot; `ids[0]` doubles as the claim flag.
struct AtomicClusterSet {
    ids: [AtomicUsize; 3],
    shift: [AtomicI32; MAX_SPECIES],
}

impl AtomicClusterSet {
    fn empty() -> Self {
        Self {
            ids: std::array::from_fn(|_| AtomicUsize::new(INVALID_INDEX)),
            shift: std::array::from_fn(|_| AtomicI32::new(0)),
        }
    }

    /// Fill in a slot whose cluster0 was already claimed.
    fn store(&self, set: &ClusterSet) {
        self.ids[1].store(set.cluster1, Ordering::Relaxed);
        self.ids[2].store(set.cluster2, Ordering::Relaxed);
        for (s, &v) in self.shift.iter().zip(set.shift.0.iter()) {
            s.store(v, Ordering::Relaxed);
        }
    }

    fn load(&self) -> ClusterSet {
        let shift = Shift(std::array::from_fn(|k| self.shift[k].load(Ordering::Relaxed)));
        ClusterSet::new(
            self.ids[0].load(Ordering::Relaxed),
            self.ids[1].load(Ordering::Relaxed),
            self.ids[2].load(Ordering::Relaxed),
        )
        .with_shift(shift)
    }
}

/// Slots of one reaction kind, grouped by first cluster.
struct KindSlots {
    /// Offsets into `slots` by cluster0, length num_clusters + 1.
    row_map: Vec<usize>,
    slots: Vec<AtomicClusterSet>,
}

impl KindSlots {
    fn from_counts(counts: &[AtomicUsize]) -> Self {
        let mut row_map = Vec::with_capacity(counts.len() + 1);
        let mut offset = 0;
        for c in counts {
            row_map.push(offset);
            offset += c.load(Ordering::Relaxed);
        }
        row_map.push(offset);
        let slots = (0..offset).map(|_| AtomicClusterSet::empty()).collect();
        Self { row_map, slots }
    }

    /// Take the first free slot of the row by compare-and-swap on cluster0.
    fn claim(&self, set: &ClusterSet) {
        let row = &self.slots[self.row_map[set.cluster0]..self.row_map[set.cluster0 + 1]];
        for slot in row {
            let taken = slot.ids[0]
                .compare_exchange(INVALID_INDEX, set.cluster0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok();
            if taken {
                slot.store(set);
                return;
            }
        }
        debug_assert!(false, "construct pass emitted more than counted for cluster {}", set.cluster0);
    }

    /// Cluster sets sorted within each first-cluster row.
    fn into_sorted(self) -> Vec<ClusterSet> {
        let num_rows = self.row_map.len() - 1;
        let row_map = &self.row_map;
        let slots = &self.slots;
        (0..num_rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                let mut sets: Vec<ClusterSet> = slots[row_map[row]..row_map[row + 1]].iter().map(|s| s.load()).collect();
                sets.sort_unstable();
                sets
            })
            .collect()
    }
}

struct ConstructEmitter {
    enabled: [bool; ReactionKind::COUNT],
    kinds: Vec<KindSlots>,
}

impl ReactionEmitter for ConstructEmitter {
    fn emit(&self, kind: ReactionKind, set: ClusterSet) {
        if self.enabled[kind.index()] {
            self.kinds[kind.index()].claim(&set);
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

fn visit_pairs<M: Material, E: ReactionEmitter>(material: &M, ctx: &GeneratorContext<'_>, emitter: &E, constants: bool) {
    let n = ctx.num_clusters();
    (0..n).into_par_iter().for_each(|j| {
        for i in 0..=j {
            if constants {
                emitter.emit(ReactionKind::Constant, ClusterSet::new(i, j, INVALID_INDEX));
                if i != j {
                    emitter.emit(ReactionKind::Constant, ClusterSet::new(j, i, INVALID_INDEX));
                }
            }
            if !ctx.is_mobile(i) && !ctx.is_mobile(j) {
                continue;
            }
            material.generate_pair(ctx, i, j, emitter);
        }
    });
}

/// Discover and build every reaction of the network.
pub fn generate<M: Material>(
    material: &M,
    subpaving: &Subpaving,
    data: &ClusterData,
    options: &NetworkOptions,
) -> ReactionCollection {
    let ctx = GeneratorContext::new(subpaving, data, options);
    let enabled = enabled_kinds(options);
    let constants = enabled[ReactionKind::Constant.index()];

    let counter = CountEmitter::new(enabled, data.num_clusters);
    visit_pairs(material, &ctx, &counter, constants);

    let constructor = ConstructEmitter {
        enabled,
        kinds: counter.counts.iter().map(|c| KindSlots::from_counts(c)).collect(),
    };
    visit_pairs(material, &ctx, &constructor, constants);

    let per_kind: Vec<Vec<Reaction>> = constructor
        .kinds
        .into_iter()
        .zip(ReactionKind::ALL)
        .map(|(slots, kind)| {
            let sets = slots.into_sorted();
            debug!("{}: {} reactions", kind.name(), sets.len());
            sets.par_iter().map(|set| Reaction::build(kind, set, data, material)).collect()
        })
        .collect();

    let reactions = ReactionCollection::from_parts(per_kind);
    debug!("{}: construct pass done, {} reactions", M::NAME, reactions.len());
    reactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ReactionNetwork;
    use crate::material::psi::PsiMaterial;

    fn helium_network(options: NetworkOptions) -> ReactionNetwork<PsiMaterial> {
        ReactionNetwork::new(&[7, 0, 0, 0, 0], 1, options).unwrap()
    }

    #[test]
    fn test_helium_pair_counts() {
        let net = helium_network(NetworkOptions::default());
        let reactions = net.reactions();
        // Pairs with a + b <= 7.
        assert_eq!(reactions.count(ReactionKind::Production), 12);
        // Every pair involving He1.
        assert_eq!(reactions.count(ReactionKind::Dissociation), 6);
        assert_eq!(reactions.count(ReactionKind::Sink), 0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = helium_network(NetworkOptions::default());
        let b = helium_network(NetworkOptions::default());
        let sets_a: Vec<_> = a.reactions().all().iter().map(|r| r.cluster_set()).collect();
        let sets_b: Vec<_> = b.reactions().all().iter().map(|r| r.cluster_set()).collect();
        assert_eq!(sets_a, sets_b);
        // Rows are sorted by first cluster within each kind.
        let prod: Vec<_> = a.reactions().of_kind(ReactionKind::Production).iter().map(|r| r.cluster_set()).collect();
        assert!(prod.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_dissociation_pairs_production() {
        let net = helium_network(NetworkOptions::default());
        let reactions = net.reactions();
        for d in reactions.of_kind(ReactionKind::Dissociation) {
            let s = d.cluster_set();
            let found = reactions.of_kind(ReactionKind::Production).iter().any(|p| {
                let q = p.cluster_set();
                q.cluster2 == s.cluster0 && q.cluster0 == s.cluster1 && q.cluster1 == s.cluster2
            });
            assert!(found, "no production behind {s:?}");
        }
    }

    #[test]
    fn test_constant_reactions_cover_all_pairs() {
        let mut options = NetworkOptions::default();
        options.reactions.constant = true;
        let net = helium_network(options);
        assert_eq!(net.reactions().count(ReactionKind::Constant), 49);
    }

    #[test]
    fn test_disabled_standard_reactions() {
        let mut options = NetworkOptions::default();
        options.reactions.standard = false;
        let net = helium_network(options);
        assert_eq!(net.reactions().count(ReactionKind::Production), 0);
        assert_eq!(net.reactions().count(ReactionKind::Dissociation), 0);
    }
}
