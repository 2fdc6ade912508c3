//! Subpaving: hierarchical tiling of composition space.
//!
//! The root region `[0, max + 1)` on every axis is split level by level
//! according to a per-level subdivision ratio, steered by a material-specific
//! [`RefinementDetector`]. Leaves the detector selects become tiles
//! (clusters) with dense ids assigned depth-first. Supports:
//! - parallel, level-synchronous construction
//! - O(depth) composition lookup by index arithmetic
//! - box queries pruned by node regions

use rayon::prelude::*;

use crate::composition::{AmountType, Composition, IndexType, Interval, Region, INVALID_INDEX, MAX_SPECIES};
use crate::error::{NetworkError, Result};

// ---------------------------------------------------------------------------
// Refinement
// ---------------------------------------------------------------------------

/// Material rules steering subpaving construction.
pub trait RefinementDetector: Sync {
    /// Decide whether `region` is split further. On `true`, `flags[k]` says
    /// whether axis `k` takes part in the split.
    fn refine(&self, region: &Region, flags: &mut [bool]) -> bool;

    /// Whether a leaf region survives as a cluster.
    fn select(&self, region: &Region) -> bool;
}

/// Number of chunks each axis is cut into at one tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubdivisionRatio {
    ratios: [AmountType; MAX_SPECIES],
    dim: usize,
}

impl SubdivisionRatio {
    pub fn new(ratios: &[AmountType]) -> Self {
        let mut all = [1; MAX_SPECIES];
        for (k, &r) in ratios.iter().take(MAX_SPECIES).enumerate() {
            all[k] = r;
        }
        Self { ratios: all, dim: ratios.len() }
    }

    /// Binary split on every axis.
    pub fn binary(dim: usize) -> Self {
        Self::new(&vec![2; dim])
    }

    #[inline]
    pub fn get(&self, axis: usize) -> AmountType {
        self.ratios[axis]
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

// ---------------------------------------------------------------------------
// Node representation
// ---------------------------------------------------------------------------

pub type NodeIndex = u32;

pub const EMPTY_NODE: NodeIndex = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct TileNode {
    region: Region,
    /// First child in the pool; children are contiguous.
    first_child: NodeIndex,
    /// Chunk count per axis, all 1 for a leaf.
    chunks: [AmountType; MAX_SPECIES],
    /// Chunk width per axis.
    widths: [AmountType; MAX_SPECIES],
    tile_id: IndexType,
}

impl TileNode {
    fn leaf(region: Region) -> Self {
        Self {
            region,
            first_child: EMPTY_NODE,
            chunks: [1; MAX_SPECIES],
            widths: [1; MAX_SPECIES],
            tile_id: INVALID_INDEX,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.first_child == EMPTY_NODE
    }

    fn num_children(&self) -> usize {
        self.chunks[..self.region.dim()].iter().map(|&c| c as usize).product()
    }

    /// Position of the child holding `comp` among this node's children.
    fn child_slot(&self, comp: &Composition) -> usize {
        let dim = self.region.dim();
        let mut slot = 0usize;
        for k in 0..dim {
            let idx = (comp[k] - self.region[k].begin) / self.widths[k];
            slot = slot * self.chunks[k] as usize + idx as usize;
        }
        slot
    }
}

/// Split plan for one node: chunks and widths per axis.
fn plan_split(region: &Region, ratio: &SubdivisionRatio, flags: &[bool]) -> Option<([AmountType; MAX_SPECIES], [AmountType; MAX_SPECIES])> {
    let mut chunks = [1; MAX_SPECIES];
    let mut widths = [1; MAX_SPECIES];
    let mut splits = false;
    for k in 0..region.dim() {
        let len = region[k].length();
        let r = ratio.get(k);
        if flags[k] && r > 1 && len > 1 {
            let w = (len + r - 1) / r;
            widths[k] = w;
            chunks[k] = (len + w - 1) / w;
            splits |= chunks[k] > 1;
        } else {
            widths[k] = len.max(1);
            chunks[k] = 1;
        }
    }
    splits.then_some((chunks, widths))
}

/// Children of `region` in lexicographic order (first axis slowest).
fn child_regions(region: &Region, chunks: &[AmountType; MAX_SPECIES], widths: &[AmountType; MAX_SPECIES]) -> Vec<Region> {
    let dim = region.dim();
    let total: usize = chunks[..dim].iter().map(|&c| c as usize).product();
    let mut out = Vec::with_capacity(total);
    let mut idx = [0 as AmountType; MAX_SPECIES];
    for _ in 0..total {
        let ivs: Vec<Interval> = (0..dim)
            .map(|k| {
                let begin = region[k].begin + idx[k] * widths[k];
                Interval::new(begin, (begin + widths[k]).min(region[k].end))
            })
            .collect();
        out.push(Region::from_intervals(&ivs));
        for k in (0..dim).rev() {
            idx[k] += 1;
            if idx[k] < chunks[k] {
                break;
            }
            idx[k] = 0;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// The subpaving itself
// ---------------------------------------------------------------------------

/// Pool-allocated tiling tree.
#[derive(Debug, Clone)]
pub struct Subpaving {
    nodes: Vec<TileNode>,
    /// Node index of each tile, by tile id.
    tile_nodes: Vec<NodeIndex>,
    depth: usize,
}

impl Subpaving {
    // -------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------

    /// Build the tiling of `[0, max + 1)` per axis.
    ///
    /// An empty `ratios` list means binary splits on every axis; otherwise
    /// level `l` uses `ratios[min(l, len - 1)]`.
    pub fn build<D: RefinementDetector>(
        max_amounts: &[AmountType],
        ratios: &[SubdivisionRatio],
        detector: &D,
    ) -> Result<Self> {
        let dim = max_amounts.len();
        if dim == 0 || dim > MAX_SPECIES {
            let expected = if dim == 0 { 1 } else { MAX_SPECIES };
            return Err(NetworkError::SpeciesCountMismatch { expected, found: dim });
        }
        let ratios = if ratios.is_empty() { vec![SubdivisionRatio::binary(dim)] } else { ratios.to_vec() };
        for (level, r) in ratios.iter().enumerate() {
            if r.dim() != dim {
                return Err(NetworkError::InvalidSubdivisionRatio {
                    level,
                    reason: format!("expected {dim} axes, got {}", r.dim()),
                });
            }
            if (0..dim).any(|k| r.get(k) == 0) {
                return Err(NetworkError::InvalidSubdivisionRatio { level, reason: "ratio 0 on an axis".into() });
            }
            if (0..dim).all(|k| r.get(k) <= 1) {
                return Err(NetworkError::InvalidSubdivisionRatio { level, reason: "no axis is subdivided".into() });
            }
        }

        let root: Vec<Interval> = max_amounts.iter().map(|&m| Interval::new(0, m + 1)).collect();
        let mut nodes = vec![TileNode::leaf(Region::from_intervals(&root))];
        let mut frontier: Vec<NodeIndex> = vec![0];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let ratio = ratios[depth.min(ratios.len() - 1)];
            // Decisions for the whole level are independent of each other.
            let plans: Vec<_> = frontier
                .par_iter()
                .map(|&n| {
                    let region = nodes[n as usize].region;
                    let mut flags = [false; MAX_SPECIES];
                    if region.is_simplex() || !detector.refine(&region, &mut flags[..dim]) {
                        return None;
                    }
                    plan_split(&region, &ratio, &flags)
                })
                .collect();

            let mut next = Vec::new();
            for (&n, plan) in frontier.iter().zip(plans) {
                let Some((chunks, widths)) = plan else { continue };
                let region = nodes[n as usize].region;
                let first = nodes.len() as NodeIndex;
                for child in child_regions(&region, &chunks, &widths) {
                    next.push(nodes.len() as NodeIndex);
                    nodes.push(TileNode::leaf(child));
                }
                let node = &mut nodes[n as usize];
                node.first_child = first;
                node.chunks = chunks;
                node.widths = widths;
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
            depth += 1;
        }

        let mut subpaving = Self { nodes, tile_nodes: Vec::new(), depth };
        subpaving.assign_ids_recursive(0, detector);
        subpaving.nodes.shrink_to_fit();
        if subpaving.tile_nodes.is_empty() {
            return Err(NetworkError::EmptyNetwork);
        }
        Ok(subpaving)
    }

    fn assign_ids_recursive<D: RefinementDetector>(&mut self, node_idx: NodeIndex, detector: &D) {
        let node = self.nodes[node_idx as usize];
        if node.is_leaf() {
            if detector.select(&node.region) {
                self.nodes[node_idx as usize].tile_id = self.tile_nodes.len();
                self.tile_nodes.push(node_idx);
            }
            return;
        }
        for c in 0..node.num_children() {
            self.assign_ids_recursive(node.first_child + c as NodeIndex, detector);
        }
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    pub fn num_tiles(&self) -> usize {
        self.tile_nodes.len()
    }

    pub fn tile_region(&self, tile_id: IndexType) -> &Region {
        &self.nodes[self.tile_nodes[tile_id] as usize].region
    }

    pub fn root_region(&self) -> &Region {
        &self.nodes[0].region
    }

    /// Tile holding `comp`, or `INVALID_INDEX`.
    pub fn find_tile_id(&self, comp: &Composition) -> IndexType {
        if !self.nodes[0].region.contains(comp) {
            return INVALID_INDEX;
        }
        let mut node = &self.nodes[0];
        while !node.is_leaf() {
            let slot = node.child_slot(comp);
            node = &self.nodes[node.first_child as usize + slot];
        }
        node.tile_id
    }

    /// Visit every tile whose region intersects `query`.
    pub fn for_each_tile_intersecting<F: FnMut(IndexType)>(&self, query: &Region, mut f: F) {
        if query.is_empty() {
            return;
        }
        self.query_recursive(0, query, &mut f);
    }

    fn query_recursive<F: FnMut(IndexType)>(&self, node_idx: NodeIndex, query: &Region, f: &mut F) {
        let node = &self.nodes[node_idx as usize];
        if !node.region.intersects(query) {
            return;
        }
        if node.is_leaf() {
            if node.tile_id != INVALID_INDEX {
                f(node.tile_id);
            }
            return;
        }
        for c in 0..node.num_children() {
            self.query_recursive(node.first_child + c as NodeIndex, query, f);
        }
    }

    /// Regions of all leaves, selected or not.
    pub fn leaf_regions(&self) -> Vec<Region> {
        self.nodes.iter().filter(|n| n.is_leaf()).map(|n| n.region).collect()
    }

    // -------------------------------------------------------------------
    // Stats
    // -------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn memory_bytes(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<TileNode>()
            + self.tile_nodes.len() * std::mem::size_of::<NodeIndex>()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Keep everything, split down to width `w` on every axis.
    struct Uniform {
        w: AmountType,
    }

    impl RefinementDetector for Uniform {
        fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
            let mut any = false;
            for (k, f) in flags.iter_mut().enumerate() {
                *f = region[k].length() > self.w;
                any |= *f;
            }
            any
        }

        fn select(&self, _region: &Region) -> bool {
            true
        }
    }

    /// Keep only compositions with a + b <= limit, exact near the boundary.
    struct Triangle {
        limit: AmountType,
    }

    impl RefinementDetector for Triangle {
        fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
            let lo = region.origin();
            let hi = region.upper_limit_point();
            let straddles = lo.total() <= self.limit && hi.total() > self.limit;
            flags.iter_mut().for_each(|f| *f = true);
            straddles
        }

        fn select(&self, region: &Region) -> bool {
            region.origin().total() <= self.limit
        }
    }

    #[test]
    fn test_leaves_partition_root() {
        let ratios = [SubdivisionRatio::new(&[3, 2]), SubdivisionRatio::new(&[2, 2])];
        let sp = Subpaving::build(&[10, 6], &ratios, &Uniform { w: 2 }).unwrap();
        let leaves = sp.leaf_regions();
        let total: f64 = leaves.iter().map(|r| r.volume()).sum();
        assert_relative_eq!(total, sp.root_region().volume());
        assert_relative_eq!(total, 11.0 * 7.0);
        for (i, a) in leaves.iter().enumerate() {
            for b in &leaves[i + 1..] {
                assert!(!a.intersects(b));
            }
        }
        assert_eq!(sp.num_tiles(), leaves.len());
    }

    #[test]
    fn test_lookup_returns_containing_tile() {
        let sp = Subpaving::build(&[10, 6], &[], &Uniform { w: 3 }).unwrap();
        for a in 0..=10 {
            for b in 0..=6 {
                let comp = Composition::from_slice(&[a, b]);
                let id = sp.find_tile_id(&comp);
                assert_ne!(id, INVALID_INDEX);
                assert!(sp.tile_region(id).contains(&comp));
            }
        }
        assert_eq!(sp.find_tile_id(&Composition::from_slice(&[11, 0])), INVALID_INDEX);
        assert_eq!(sp.find_tile_id(&Composition::from_slice(&[1])), INVALID_INDEX);
    }

    #[test]
    fn test_discarded_leaves_are_misses() {
        let sp = Subpaving::build(&[7, 7], &[], &Triangle { limit: 7 }).unwrap();
        assert_ne!(sp.find_tile_id(&Composition::from_slice(&[3, 4])), INVALID_INDEX);
        assert_eq!(sp.find_tile_id(&Composition::from_slice(&[4, 4])), INVALID_INDEX);
        for id in 0..sp.num_tiles() {
            assert!(sp.tile_region(id).origin().total() <= 7);
        }
    }

    #[test]
    fn test_one_dimensional_ids_are_ordered() {
        let sp = Subpaving::build(&[7], &[], &Uniform { w: 1 }).unwrap();
        assert_eq!(sp.num_tiles(), 8);
        for n in 0..8 {
            assert_eq!(sp.find_tile_id(&Composition::from_slice(&[n])), n as usize);
        }
    }

    #[test]
    fn test_box_query() {
        let sp = Subpaving::build(&[15, 15], &[], &Uniform { w: 4 }).unwrap();
        let query = Region::from_intervals(&[Interval::new(3, 6), Interval::new(0, 1)]);
        let mut hits = Vec::new();
        sp.for_each_tile_intersecting(&query, |id| hits.push(id));
        assert_eq!(hits.len(), 2);
        for id in hits {
            assert!(sp.tile_region(id).intersects(&query));
        }
    }

    #[test]
    fn test_rejects_bad_ratios() {
        let err = Subpaving::build(&[4, 4], &[SubdivisionRatio::new(&[1, 1])], &Uniform { w: 1 });
        assert!(matches!(err, Err(NetworkError::InvalidSubdivisionRatio { .. })));
        let err = Subpaving::build(&[4, 4], &[SubdivisionRatio::new(&[2, 0])], &Uniform { w: 1 });
        assert!(err.is_err());
        let err = Subpaving::build(&[4, 4], &[SubdivisionRatio::new(&[2])], &Uniform { w: 1 });
        assert!(err.is_err());
    }
}
