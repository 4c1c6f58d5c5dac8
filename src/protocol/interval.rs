// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Exponential retry timeout generator

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-command timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// First timeout value
    pub min: Duration,
    /// Upper bound of the sequence
    pub max: Duration,
    /// Growth factor applied after each value
    pub factor: u32,
}

impl TimeoutPolicy {
    pub const fn new(min: Duration, max: Duration, factor: u32) -> Self {
        Self { min, max, factor }
    }

    /// Fresh generator for this policy
    pub fn interval(&self) -> Interval {
        Interval::new(self.min, self.max, self.factor)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(128), 2)
    }
}

/// Stateful generator of growing timeout values
///
/// Each call to [`Interval::next_timeout`] returns the current value, then
/// multiplies it by the factor, clamped to the maximum. One instance lives
/// for the whole retry series of a single enqueued command.
#[derive(Debug, Clone)]
pub struct Interval {
    current: Duration,
    max: Duration,
    factor: u32,
}

impl Interval {
    pub fn new(initial: Duration, max: Duration, factor: u32) -> Self {
        Self {
            current: initial.min(max),
            max,
            factor: factor.max(1),
        }
    }

    pub fn next_timeout(&mut self) -> Duration {
        let value = self.current;
        self.current = self
            .current
            .checked_mul(self.factor)
            .map_or(self.max, |next| next.min(self.max));
        value
    }
}

impl Iterator for Interval {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_timeout())
    }
}
