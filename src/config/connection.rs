// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use serde::{Deserialize, Serialize};

/// Network endpoint of the serial-to-TCP bridge wired to the station.
///
/// # Example
///
/// ```
/// use rust_ema::config::ConnectionConfig;
///
/// let connection = ConnectionConfig {
///     address: "192.168.1.50".to_string(),
///     port: 2000,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host name or IP address of the bridge. Default is "127.0.0.1".
    #[serde(default = "default_address")]
    pub address: String,

    /// TCP port of the bridge, 1-65535. Default is 2000.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl ConnectionConfig {
    /// `address:port` string accepted by `TcpStream::connect`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
