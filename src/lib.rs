// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust EMA library
//!
//! Host-side protocol engine for EMA environmental monitoring stations: wire
//! framing, status frame decoding, the command catalogue, a single in-flight
//! command dispatcher and a station facade on top of it.

pub mod config;
pub mod device;
pub mod protocol;
