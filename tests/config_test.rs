// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

use rust_ema::config::{self, Config, ConnectionConfig, TimeoutConfig};
use rust_ema::protocol::TimeoutPolicy;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut custom = Config::default();
    custom.connection = ConnectionConfig {
        address: "192.168.1.50".to_string(),
        port: 4001,
    };
    custom.protocol.retries = Some(4);
    custom.save_to_file(&config_path)?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded, custom);
    assert_eq!(loaded.connection.endpoint(), "192.168.1.50:4001");

    // A missing file is created with defaults
    let missing = temp_dir.path().join("missing.yaml");
    let default_config = Config::from_file(&missing)?;
    assert!(missing.exists());
    assert_eq!(default_config, Config::default());
    assert_eq!(default_config.connection.port, 2000);
    Ok(())
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "connection:\n  address: ema.local\nprotocol:\n  timeout:\n    min_ms: 500\n",
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.connection.address, "ema.local");
    assert_eq!(config.connection.port, 2000);
    assert_eq!(config.protocol.timeout.min_ms, 500);
    assert_eq!(config.protocol.timeout.max_ms, 128_000);
    assert_eq!(config.protocol.status_latency_ms, 500);
    assert_eq!(config.logging.level, "info");
    Ok(())
}

#[test]
fn test_empty_file_is_default() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "")?;
    assert_eq!(Config::from_file(&config_path)?, Config::default());
    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();
    config.apply_args(Some("10.0.0.7".to_string()), Some(4002), true);
    assert_eq!(config.connection.address, "10.0.0.7");
    assert_eq!(config.connection.port, 4002);
    assert_eq!(config.logging.level, "debug");

    config.apply_args(None, None, false);
    assert_eq!(config.connection.port, 4002);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_engine_settings() {
    let mut config = Config::default();
    config.protocol.timeout = TimeoutConfig {
        min_ms: 1_000,
        max_ms: 8_000,
        factor: 3,
    };
    let settings = config.protocol.engine_settings();
    assert_eq!(settings.retries, None);
    assert_eq!(
        settings.timeout,
        Some(TimeoutPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            3
        ))
    );
    assert_eq!(settings.status_latency, Duration::from_millis(500));
}

#[test]
fn test_config_schema_output() -> Result<()> {
    config::output_config_schema()?;
    Ok(())
}
