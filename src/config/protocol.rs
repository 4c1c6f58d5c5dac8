// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::{EngineSettings, TimeoutPolicy};

/// Timeout policy of commands that do not declare their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// First timeout in milliseconds
    #[serde(default = "default_min_ms")]
    pub min_ms: u64,

    /// Largest timeout in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Growth factor applied after each timeout, at least 1
    #[serde(default = "default_factor")]
    pub factor: u32,
}

fn default_min_ms() -> u64 {
    2_000
}

fn default_max_ms() -> u64 {
    128_000
}

fn default_factor() -> u32 {
    2
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            min_ms: default_min_ms(),
            max_ms: default_max_ms(),
            factor: default_factor(),
        }
    }
}

impl From<TimeoutConfig> for TimeoutPolicy {
    fn from(config: TimeoutConfig) -> Self {
        TimeoutPolicy::new(
            Duration::from_millis(config.min_ms),
            Duration::from_millis(config.max_ms),
            config.factor,
        )
    }
}

/// Protocol engine tunables.
///
/// The retry budget is optional: when absent every command keeps its own
/// (2 for regular commands, 1 for bulk dumps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(default)]
    pub timeout: TimeoutConfig,

    /// Serial latency added to status capture timestamps
    #[serde(default = "default_status_latency_ms")]
    pub status_latency_ms: u64,
}

fn default_status_latency_ms() -> u64 {
    500
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            retries: None,
            timeout: TimeoutConfig::default(),
            status_latency_ms: default_status_latency_ms(),
        }
    }
}

impl ProtocolConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            retries: self.retries,
            timeout: Some(self.timeout.into()),
            status_latency: Duration::from_millis(self.status_latency_ms),
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of off, error, warn, info, debug, trace. `RUST_LOG` wins when set.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}
