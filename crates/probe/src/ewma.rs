//! Exponentially weighted moving average

/// Average age of the samples in the window
pub const DEFAULT_EWMA_AGE: f64 = 30.0;

/// Simple EWMA; the first sample seeds the value.
///
/// A value of exactly zero counts as "no samples yet", so a run of
/// leading zero samples does not drag the average down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleEwma {
    value: f64,
    decay: f64,
}

impl Default for SimpleEwma {
    fn default() -> Self {
        Self::with_age(DEFAULT_EWMA_AGE)
    }
}

impl SimpleEwma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_age(age: f64) -> Self {
        Self {
            value: 0.0,
            decay: 2.0 / (age + 1.0),
        }
    }

    pub fn add(&mut self, sample: f64) {
        if self.value == 0.0 {
            self.value = sample;
        } else {
            self.value = sample * self.decay + self.value * (1.0 - self.decay);
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}
