// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error kinds surfaced by the protocol engine
//!
//! A frame that does not match the pending command is not an error: it is
//! re-offered to unsolicited classification. Only the kinds below ever reach
//! the caller of [`EmaProtocol::execute`](crate::protocol::EmaProtocol::execute).

use thiserror::Error;

/// Errors raised while decoding a fixed-width status frame
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatusError {
    #[error("Status frame has {actual} characters, expected {expected}")]
    BadLength { expected: usize, actual: usize },

    #[error("Status field '{field}' holds an invalid value '{value}'")]
    BadField { field: &'static str, value: String },
}

/// Errors surfaced by the protocol engine to the issuer of a command
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No matching reply arrived within the whole retry budget
    #[error("Command '{command}' timed out after {attempts} attempt(s)")]
    Timeout { command: String, attempts: u32 },

    /// A captured group could not be converted to the command's value domain
    #[error("Command '{command}' received a malformed {field}: '{value}'")]
    MalformedValue {
        command: String,
        field: &'static str,
        value: String,
    },

    /// A status line inside a bulk dump could not be decoded
    #[error("Command '{command}' received a bad status line: {source}")]
    Status {
        command: String,
        #[source]
        source: StatusError,
    },

    /// A set value does not fit the field of its request template
    #[error("Value {value} is out of range for {setting} ({min} to {max})")]
    Range {
        setting: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A command descriptor could not be built
    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    /// The engine task is gone (transport closed or shut down)
    #[error("Protocol engine is not running")]
    Disconnected,

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True when the error is a retry exhaustion
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout { .. })
    }
}
