//! Physical constants. Lengths in nm, energies in eV.

/// Boltzmann constant in eV/K.
pub const K_BOLTZMANN: f64 = 8.617_332_400E-5;

pub const PI: f64 = std::f64::consts::PI;

// --- lattice parameters ---
pub const TUNGSTEN_LATTICE_CONSTANT: f64 = 0.317;
pub const URANIUM_DIOXIDE_LATTICE_CONSTANT: f64 = 0.547;
pub const IRON_LATTICE_CONSTANT: f64 = 0.287;
/// a-constant of hcp zirconium.
pub const ALPHA_ZR_LATTICE_CONSTANT: f64 = 0.322_945;
/// c/a ratio of hcp zirconium.
pub const ALPHA_ZR_C_OVER_A: f64 = 1.593;

// --- radii ---
pub const HELIUM_RADIUS: f64 = 0.3;
pub const XENON_RADIUS: f64 = 0.3;
pub const ALPHA_ZR_CORE_RADIUS: f64 = 0.645;

// --- sinks ---
/// Dislocation density used by generic sink reactions, nm^-2.
pub const DEFAULT_DISLOCATION_DENSITY: f64 = 0.0003;
/// Network dislocation density, nm^-2.
pub const RHO_D: f64 = 1e-6;
/// a-type and c-type sink strengths of single-crystal zirconium, nm^-2.
pub const ALPHA_ZR_A_SINK_STRENGTH: f64 = 7.25e-8;
pub const ALPHA_ZR_C_SINK_STRENGTH: f64 = 2.25e-8;
