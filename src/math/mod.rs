pub mod constants;

pub use constants::*;

/// `exp(-energy / (kB T))`, zero for non-positive temperature.
#[inline]
pub fn boltzmann_factor(energy: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    (-energy / (K_BOLTZMANN * temperature)).exp()
}

/// Radius of a sphere holding `n` atoms of volume `atomic_volume`.
#[inline]
pub fn sphere_radius(n: f64, atomic_volume: f64) -> f64 {
    (3.0 * n * atomic_volume / (4.0 * PI)).cbrt()
}

/// Linear interpolation between `a` and `b` with `t` clamped to [0, 1].
#[inline]
pub fn lerp_clamped(a: f64, b: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    a + (b - a) * t
}
