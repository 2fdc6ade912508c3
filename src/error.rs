//! Error type shared by network construction and evaluation.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("expected {expected} maximum amounts (one per species), got {found}")]
    SpeciesCountMismatch { expected: usize, found: usize },

    #[error("grid size must be at least 1")]
    ZeroGridSize,

    #[error("invalid subdivision ratio at level {level}: {reason}")]
    InvalidSubdivisionRatio { level: usize, reason: String },

    #[error("the refinement rules selected no clusters")]
    EmptyNetwork,

    #[error("{what}: expected length {expected}, got {found}")]
    DimensionMismatch { what: &'static str, expected: usize, found: usize },

    #[error("reactions are stale after a structural change; call initialize_reactions first")]
    StaleReactions,

    #[error("required cluster {composition} is not part of the network")]
    MissingCluster { composition: String },

    #[error("cluster map does not match the network at cluster {cluster}")]
    ClusterMapMismatch { cluster: usize },

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Fails with `DimensionMismatch` unless `found == expected`.
pub fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(NetworkError::DimensionMismatch { what, expected, found })
    }
}
