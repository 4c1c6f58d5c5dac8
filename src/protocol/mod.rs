// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! EMA weather station protocol
//!
//! The station talks a half-duplex, parenthesis-delimited ASCII protocol over
//! a serial line (usually bridged to TCP). The host sends one request at a
//! time and waits for one or more acknowledgement lines; meanwhile the station
//! keeps broadcasting status frames and photometer readings on its own.
//!
//! ## Key Components
//!
//! - [`framer::LineFramer`]: splits the byte stream into frames
//! - [`status`]: the 83 character status frame codec
//! - [`Command`]: request/response descriptor and decode state machine
//! - [`commands`]: the command catalogue
//! - [`bulk`]: flash history dumps
//! - [`Dispatcher`]: single in-flight command queue and unsolicited fan-out
//! - [`ProtocolEngine`] / [`EmaProtocol`]: tokio task and its handle
//!
//! ## Wire format
//!
//! ```text
//! host    -> (i)
//! station <- (I105)
//! station <- (I+00)
//! station <- (I00100)
//! ```

pub mod bulk;
pub mod command;
pub mod commands;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod framer;
pub mod interval;
pub mod status;
pub mod unsolicited;

pub use bulk::{AverageEntry, BulkDump, DumpKind, MinMaxEntry};
pub use command::{AuxRelaySettings, Command, CommandBuilder, Extract, Progress, Value};
pub use dispatcher::{CallbackId, Dispatcher, PhotometerEvent, StatusEvent};
pub use engine::{EmaProtocol, EngineSettings, ProtocolEngine};
pub use error::{ProtocolError, StatusError};
pub use framer::LineFramer;
pub use interval::{Interval, TimeoutPolicy};
pub use status::{decode_freq, decode_status, encode_freq, encode_status, magnitude, StatusRecord};
