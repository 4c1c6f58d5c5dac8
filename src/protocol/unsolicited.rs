// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Classification of frames the station sends on its own
//!
//! Patterns are tried in table order once the pending command (if any) has
//! declined the frame.

use log::error;
use regex::Regex;
use std::sync::LazyLock;

use super::command::pattern;

/// Kind of an unsolicited frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsolicited {
    /// Periodic general status broadcast
    Status,
    /// The photometer is about to report, outbound traffic must hold
    PhotometerBegin,
    /// Photometer reading, carries the encoded frequency
    PhotometerEnd { encoded: String },
    /// Thermopile I2C sensor reading
    Thermopile,
    /// Relay timer activity notice
    Timer,
    /// Datalogger activity notice
    Datalogger,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Status,
    PhotometerBegin,
    PhotometerEnd,
    Thermopile,
    Timer,
    Datalogger,
}

const TABLE_SOURCE: &[(Kind, &str)] = &[
    (Kind::Status, r"^\(.{76}a\d{4}\)$"),
    (Kind::PhotometerBegin, r"^\(mv:begin\)$"),
    (Kind::PhotometerEnd, r"^\(mv:(\d{5})\)$"),
    (Kind::Thermopile, r"^\(T[+-]\d{3}[+-]\d{3}\)$"),
    (
        Kind::Timer,
        r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} (?:Timer|Switch) [^)]*\)$",
    ),
    (
        Kind::Datalogger,
        r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Datalogger[^)]*\)$",
    ),
];

static TABLE: LazyLock<Vec<(Kind, Regex)>> = LazyLock::new(|| {
    TABLE_SOURCE
        .iter()
        .filter_map(|(kind, re)| match pattern(*re) {
            Ok(compiled) => Some((*kind, compiled)),
            Err(e) => {
                error!("Unsolicited {:?} pattern does not compile: {}", kind, e);
                None
            }
        })
        .collect()
});

/// Classify a frame, `None` when it is unknown
pub fn classify(frame: &str) -> Option<Unsolicited> {
    TABLE.iter().find_map(|(kind, re)| {
        let captures = re.captures(frame)?;
        Some(match kind {
            Kind::Status => Unsolicited::Status,
            Kind::PhotometerBegin => Unsolicited::PhotometerBegin,
            Kind::PhotometerEnd => Unsolicited::PhotometerEnd {
                encoded: captures.get(1).map_or("", |m| m.as_str()).to_string(),
            },
            Kind::Thermopile => Unsolicited::Thermopile,
            Kind::Timer => Unsolicited::Timer,
            Kind::Datalogger => Unsolicited::Datalogger,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::tests::GOLDEN;

    #[test]
    fn test_classification() {
        assert_eq!(classify(GOLDEN), Some(Unsolicited::Status));
        assert_eq!(classify("(mv:begin)"), Some(Unsolicited::PhotometerBegin));
        assert_eq!(
            classify("(mv:31234)"),
            Some(Unsolicited::PhotometerEnd {
                encoded: "31234".into()
            })
        );
        assert_eq!(classify("(T+215-034)"), Some(Unsolicited::Thermopile));
        assert_eq!(
            classify("(12:34:56 20/06/2016 Timer ON)"),
            Some(Unsolicited::Timer)
        );
        assert_eq!(
            classify("(12:34:56 20/06/2016 Datalogger written)"),
            Some(Unsolicited::Datalogger)
        );
    }

    #[test]
    fn test_unknown_and_dump_lines() {
        assert_eq!(classify("(W020)"), None);
        assert_eq!(classify("garbage)"), None);
        assert_eq!(classify(&GOLDEN.replacen("371a", "371M", 1)), None);
    }
}
