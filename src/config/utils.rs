// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Validation rules beyond the JSON schema and schema output.

use anyhow::{Context, Result};
use log::{debug, LevelFilter};

use super::Config;

/// Print the embedded JSON schema, for `--show-config-schema`
///
/// ```bash
/// ./rust_ema --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");
    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Check if a string is an IP address or one of the special host values
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validate the rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Port**: the bridge port cannot be 0
/// - **Timeout policy**: `factor >= 1`, `0 < min_ms <= max_ms`
/// - **Log level**: parses as a `log::LevelFilter`
/// - **Address**: host names are accepted, only logged when not an IP address
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.connection.port == 0 {
        anyhow::bail!("Invalid port number: {}", config.connection.port);
    }

    let timeout = &config.protocol.timeout;
    if timeout.factor < 1 {
        anyhow::bail!("Timeout factor must be at least 1, got {}", timeout.factor);
    }
    if timeout.min_ms == 0 {
        anyhow::bail!("Minimum timeout must be positive");
    }
    if timeout.min_ms > timeout.max_ms {
        anyhow::bail!(
            "Minimum timeout ({} ms) exceeds maximum timeout ({} ms)",
            timeout.min_ms,
            timeout.max_ms
        );
    }

    config
        .logging
        .level
        .parse::<LevelFilter>()
        .with_context(|| format!("Invalid log level: {}", config.logging.level))?;

    if !is_valid_ip_address(&config.connection.address) {
        debug!(
            "Station address is a host name: {}",
            config.connection.address
        );
    }

    Ok(())
}
