//! Lock-free progress reporting for long-running cache operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing fraction in `[0.0, 1.0]`, stored as f64 bits
/// in an atomic so readers poll without locking.
///
/// `set` never moves backwards: concurrent page completions may report out
/// of order, and the displayed value should not jitter downwards.
#[derive(Debug, Default)]
pub struct Progress {
    bits: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Raise the fraction to `value` if it is an increase.
    pub fn set(&self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            if f64::from_bits(current) >= value {
                return;
            }
            match self.bits.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Drop back to zero for a new run.
    pub fn reset(&self) {
        self.bits.store(0f64.to_bits(), Ordering::Release);
    }
}
