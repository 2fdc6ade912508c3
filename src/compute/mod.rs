//! Lock-free accumulation buffers.
//!
//! Many reactions add into the same flux slot or Jacobian entry
//! concurrently, so evaluation writes through `AtomicF64::fetch_add`
//! and the result is copied into the caller's slice afterwards.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

/// `f64` stored as bits in an `AtomicU64`.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically add `delta`, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.0.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Fixed-length array of atomically accumulated values.
#[derive(Debug)]
pub struct AtomicBuffer {
    values: Vec<AtomicF64>,
}

impl AtomicBuffer {
    pub fn zeros(len: usize) -> Self {
        Self { values: (0..len).map(|_| AtomicF64::default()).collect() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn add(&self, index: usize, delta: f64) {
        if delta != 0.0 {
            self.values[index].fetch_add(delta);
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.values[index].load()
    }

    /// `out[i] += self[i]` for every slot.
    pub fn add_into(&self, out: &mut [f64]) {
        out.par_iter_mut()
            .zip(self.values.par_iter())
            .for_each(|(o, v)| *o += v.load());
    }

    /// `out[i] = self[i]` for every slot.
    pub fn copy_into(&self, out: &mut [f64]) {
        out.par_iter_mut()
            .zip(self.values.par_iter())
            .for_each(|(o, v)| *o = v.load());
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.load()).collect()
    }
}
