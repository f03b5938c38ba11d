//! Rolling-window z-score tracker with warmup and flat-market guards.
//!
//! The guards are load-bearing: a z-score emitted before `min_samples`
//! observations, or against a near-zero standard deviation, turns startup
//! noise into alerts. Absent means absent, never zero or NaN.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use tracing::debug;

pub const DEFAULT_WINDOW_SIZE: usize = 300;
pub const DEFAULT_MIN_SAMPLES: usize = 30;
pub const DEFAULT_MIN_STD: Decimal = dec!(0.0001);

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ZScoreConfigError {
    #[error("window_size ({0}) must be >= min_samples ({1})")]
    WindowTooSmall(usize, usize),
    #[error("min_samples must be at least 2")]
    MinSamplesTooSmall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZScoreStatus {
    pub samples_collected: usize,
    pub samples_required: usize,
    pub is_ready: bool,
    pub current_mean: Option<Decimal>,
    pub current_std: Option<Decimal>,
}

#[derive(Debug)]
pub struct ZScoreCalculator {
    window_size: usize,
    min_samples: usize,
    min_std: Decimal,
    buffer: VecDeque<Decimal>,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ZScoreCalculator {
    pub fn new(
        window_size: usize,
        min_samples: usize,
        min_std: Decimal,
    ) -> Result<Self, ZScoreConfigError> {
        if min_samples < 2 {
            return Err(ZScoreConfigError::MinSamplesTooSmall);
        }
        if window_size < min_samples {
            return Err(ZScoreConfigError::WindowTooSmall(window_size, min_samples));
        }
        Ok(Self {
            window_size,
            min_samples,
            min_std,
            buffer: VecDeque::with_capacity(window_size),
            timestamps: VecDeque::with_capacity(window_size),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    /// Current window contents, oldest first. Used to persist the buffer.
    pub fn samples(&self) -> impl Iterator<Item = &Decimal> {
        self.buffer.iter()
    }

    /// Adds a sample and returns the z-score, or `None` during warmup or
    /// when the window is too flat to standardize against.
    pub fn add_sample(&mut self, value: Decimal, timestamp: DateTime<Utc>) -> Option<Decimal> {
        if self.buffer.len() == self.window_size {
            self.buffer.pop_front();
            self.timestamps.pop_front();
        }
        self.buffer.push_back(value);
        self.timestamps.push_back(timestamp);

        if self.buffer.len() < self.min_samples {
            return None;
        }

        let mean = self.mean();
        let std = self.std(mean);
        if std < self.min_std {
            return None;
        }

        Some((value - mean) / std)
    }

    fn mean(&self) -> Decimal {
        let total: Decimal = self.buffer.iter().sum();
        total / Decimal::from(self.buffer.len())
    }

    /// Sample standard deviation (n - 1 denominator).
    fn std(&self, mean: Decimal) -> Decimal {
        let n = self.buffer.len();
        if n <= 1 {
            return Decimal::ZERO;
        }
        let variance_sum: Decimal = self.buffer.iter().map(|x| (x - mean) * (x - mean)).sum();
        let variance = variance_sum / Decimal::from(n as u64 - 1);
        variance.sqrt().unwrap_or(Decimal::ZERO)
    }

    /// Clears the window. Must be called on gap detection or regime change;
    /// the calculator re-enters warmup afterwards.
    pub fn reset(&mut self, reason: &str) {
        debug!(reason, dropped = self.buffer.len(), "zscore buffer reset");
        self.buffer.clear();
        self.timestamps.clear();
    }

    pub fn status(&self) -> ZScoreStatus {
        let samples_collected = self.buffer.len();
        if samples_collected >= self.min_samples {
            let mean = self.mean();
            let std = self.std(mean);
            if std >= self.min_std {
                return ZScoreStatus {
                    samples_collected,
                    samples_required: self.min_samples,
                    is_ready: true,
                    current_mean: Some(mean),
                    current_std: Some(std),
                };
            }
        }
        ZScoreStatus {
            samples_collected,
            samples_required: self.min_samples,
            is_ready: false,
            current_mean: None,
            current_std: None,
        }
    }
}
