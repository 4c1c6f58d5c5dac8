// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Line framer for the parenthesis-delimited EMA wire format
//!
//! Frames are delimited by the closing parenthesis only. Leading blanks and
//! control characters (CR/LF left over from the previous frame) are stripped
//! and the delimiter is kept at the end of the emitted frame.
//!
//! Bytes are mapped one-to-one onto `char`s (ISO-8859-1), so the single-byte
//! binary voltage field of the status frame survives the trip into a `String`
//! and keeps its raw code point.

use bytes::{Buf, BytesMut};
use log::{debug, warn};
use std::io;
use tokio_util::codec::Decoder;

/// Frame delimiter
pub const DELIMITER: u8 = b')';

/// Upper bound for a frame without delimiter before the buffer is discarded
pub const MAX_FRAME_LEN: usize = 1024;

/// `tokio_util` decoder splitting the byte stream into frames
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    // Number of bytes already scanned for a delimiter
    next_index: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineFramer {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let scan_from = self.next_index.min(src.len());
        match src[scan_from..].iter().position(|&b| b == DELIMITER) {
            Some(offset) => {
                let end = scan_from + offset + 1;
                let raw = src.split_to(end);
                self.next_index = 0;
                Ok(Some(to_frame(&raw)))
            }
            None if src.len() > MAX_FRAME_LEN => {
                warn!(
                    "Discarding {} bytes received without a frame delimiter",
                    src.len()
                );
                src.advance(src.len());
                self.next_index = 0;
                Ok(None)
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.iter().any(|b| !b.is_ascii_whitespace()) {
            debug!(
                "Dropping unterminated frame at end of stream: {}",
                printable(&to_frame(src))
            );
        }
        src.clear();
        self.next_index = 0;
        Ok(None)
    }
}

/// Build a frame from raw bytes ending with the delimiter
fn to_frame(raw: &[u8]) -> String {
    let start = raw
        .iter()
        .position(|&b| !(b.is_ascii_whitespace() || b.is_ascii_control()))
        .unwrap_or(raw.len());
    raw[start..].iter().map(|&b| b as char).collect()
}

/// Render a frame for logging, replacing non printable characters with `?`
///
/// The voltage byte of a status frame is binary and frequently above 127;
/// this substitution only affects the log line, never the decoded value.
pub fn printable(frame: &str) -> String {
    frame
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect()
}
