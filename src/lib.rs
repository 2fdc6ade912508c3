//! defect-network: reaction network engine for cluster dynamics of point
//! defects and impurities in irradiated materials.
//!
//! Architecture:
//! - Composition space tiled by a pool-allocated subpaving (subpaving module);
//!   tiles are simplices (one cluster) or super-clusters carrying first-order
//!   moments per grouped axis
//! - SoA cluster property store with per-grid diffusion coefficients (cluster module)
//! - Two-pass count/claim reaction discovery driven by a material strategy
//!   (generator and material modules)
//! - Per-kind flux and Jacobian kernels with precomputed overlap coefficients
//!   and lock-free accumulation (reaction and compute modules)
//! - CRS Jacobian pattern built in parallel (graph module)
//!
//! Solvers talk to [`ReactionNetwork`]: set temperatures, then evaluate
//! fluxes and partial derivatives one grid point at a time.

pub mod cluster;
pub mod composition;
pub mod compute;
pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod material;
pub mod math;
pub mod network;
pub mod reaction;
pub mod species;
pub mod subpaving;

pub use composition::{AmountType, Composition, IndexType, Interval, Region, INVALID_INDEX};
pub use config::{GroupingParams, NetworkOptions, ReactionToggles};
pub use error::{NetworkError, Result};
pub use material::fe::{FeMaterial, FeSpecies};
pub use material::ne::{NeMaterial, NeSpecies};
pub use material::psi::{PsiMaterial, PsiSpecies};
pub use material::zr::{ZrMaterial, ZrSpecies};
pub use material::Material;
pub use network::{NetworkBuilder, ReactionNetwork, TotalKind, TotalQuantity};
pub use reaction::{GridPoint, ReactionKind};
pub use species::Species;
