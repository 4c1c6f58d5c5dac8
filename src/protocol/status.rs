// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! General status frame codec (protocol version 2)
//!
//! The status frame is a fixed-width, fixed-offset record of 83 characters
//! including the enclosing parentheses:
//!
//! | Chars  | Field                          | Scaling           |
//! |--------|--------------------------------|-------------------|
//! | 1      | Roof relay state               | letter            |
//! | 2      | Aux relay state                | letter            |
//! | 3      | Supply voltage                 | raw byte × 0.1 V  |
//! | 5..9   | Rain                           | × 0.1 %           |
//! | 10..14 | Cloud                          | × 0.1 %           |
//! | 15..20 | Absolute pressure              | × 0.1 hPa         |
//! | 21..26 | Calibrated pressure            | × 0.1 hPa         |
//! | 27..31 | Pluviometer, current           | × 0.1 mm          |
//! | 32..37 | Pluviometer, accumulated       | × 0.1 mm          |
//! | 38..42 | Pyranometer                    | × 0.1 %           |
//! | 43..48 | Photometer frequency           | exponent+mantissa |
//! | 49..53 | Ambient temperature            | × 0.1 °C, signed  |
//! | 54..58 | Relative humidity              | × 0.1 %           |
//! | 59..63 | Dew point                      | × 0.1 °C, signed  |
//! | 64..68 | Wind speed, current            | × 0.1 km/h        |
//! | 69..73 | Wind speed, 10 minute average  | × 0.1 km/h        |
//! | 74..77 | Wind direction                 | degrees mod 360   |
//! | 77     | Record marker                  | `a`, `M`, `m`, `t`|
//! | 78..82 | Flash page                     | 0..287            |
//!
//! Field order and scaling are protocol constants and must not be reordered.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::error::StatusError;

/// Length of a status frame including both parentheses
pub const STATUS_LEN: usize = 83;

/// Number of flash pages (5 minute resolution over a day)
pub const PAGES_PER_DAY: u16 = 288;

/// Marker of a live, periodic status broadcast
pub const MARKER_LIVE: char = 'a';
/// Marker of the maximum values line of a daily min/max dump
pub const MARKER_MAX: char = 'M';
/// Marker of the minimum values line of a daily min/max dump
pub const MARKER_MIN: char = 'm';
/// Marker of a five minute average line
pub const MARKER_AVERAGE: char = 't';

const ROOF: usize = 1;
const AUX: usize = 2;
const VOLTAGE: usize = 3;
const RAIN: Range<usize> = 5..9;
const CLOUD: Range<usize> = 10..14;
const ABS_PRESSURE: Range<usize> = 15..20;
const CAL_PRESSURE: Range<usize> = 21..26;
const PLUV_CURRENT: Range<usize> = 27..31;
const PLUV_ACCUMULATED: Range<usize> = 32..37;
const PYRANOMETER: Range<usize> = 38..42;
const PHOTOMETER: Range<usize> = 43..48;
const TEMPERATURE: Range<usize> = 49..53;
const HUMIDITY: Range<usize> = 54..58;
const DEW_POINT: Range<usize> = 59..63;
const WIND_CURRENT: Range<usize> = 64..68;
const WIND_AVERAGE: Range<usize> = 69..73;
const WIND_DIRECTION: Range<usize> = 74..77;
const MARKER: usize = 77;
const PAGE: Range<usize> = 78..82;

/// Offset subtracted from the exponent digit of an encoded frequency
const FREQ_EXPONENT_OFFSET: i32 = 3;

/// Magnitude reported when the photometer sees nothing usable
pub const MAX_MAGNITUDE: f64 = 24.0;

/// Decoded general status record
///
/// Built fresh on every status decode and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub roof_relay: char,
    pub aux_relay: char,
    /// Volts
    pub voltage: f64,
    /// Percent
    pub rain: f64,
    /// Percent
    pub cloud: f64,
    /// hPa
    pub abs_pressure: f64,
    /// hPa
    pub cal_pressure: f64,
    /// mm
    pub pluviometer_current: f64,
    /// mm
    pub pluviometer_accumulated: f64,
    /// Percent
    pub pyranometer: f64,
    /// Hz
    pub photometer_frequency: f64,
    /// °C
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
    /// °C
    pub dew_point: f64,
    /// km/h
    pub wind_speed: f64,
    /// km/h
    pub wind_speed_10m: f64,
    /// Degrees
    pub wind_direction: u16,
}

impl StatusRecord {
    /// Human readable roof relay state
    pub fn roof_relay_name(&self) -> &'static str {
        match self.roof_relay {
            'C' => "Closed",
            'A' => "Open",
            'a' => "Open/Timer",
            _ => "Unknown",
        }
    }

    /// Human readable auxiliary relay state
    pub fn aux_relay_name(&self) -> &'static str {
        match self.aux_relay {
            'E' => "On",
            'e' => "Off",
            'T' => "Timer/On",
            't' => "Timer/Off",
            _ => "Unknown",
        }
    }
}

/// Decode a status frame into its record and flash page
///
/// The record marker is not checked; callers select frames by pattern first.
pub fn decode_status(frame: &str) -> Result<(StatusRecord, u16), StatusError> {
    let chars: Vec<char> = frame.chars().collect();
    if chars.len() != STATUS_LEN {
        return Err(StatusError::BadLength {
            expected: STATUS_LEN,
            actual: chars.len(),
        });
    }

    let record = StatusRecord {
        roof_relay: chars[ROOF],
        aux_relay: chars[AUX],
        // Binary single byte, not ASCII digits
        voltage: round(chars[VOLTAGE] as u32 as f64 * 0.1, 1),
        rain: scaled(&chars, RAIN, "rain")?,
        cloud: scaled(&chars, CLOUD, "cloud")?,
        abs_pressure: scaled(&chars, ABS_PRESSURE, "absolute pressure")?,
        cal_pressure: scaled(&chars, CAL_PRESSURE, "calibrated pressure")?,
        pluviometer_current: scaled(&chars, PLUV_CURRENT, "pluviometer current")?,
        pluviometer_accumulated: scaled(&chars, PLUV_ACCUMULATED, "pluviometer accumulated")?,
        pyranometer: scaled(&chars, PYRANOMETER, "pyranometer")?,
        photometer_frequency: decode_freq(&slice(&chars, PHOTOMETER))?,
        temperature: scaled(&chars, TEMPERATURE, "temperature")?,
        humidity: scaled(&chars, HUMIDITY, "humidity")?,
        dew_point: scaled(&chars, DEW_POINT, "dew point")?,
        wind_speed: scaled(&chars, WIND_CURRENT, "wind speed")?,
        wind_speed_10m: scaled(&chars, WIND_AVERAGE, "wind speed average")?,
        wind_direction: integer(&chars, WIND_DIRECTION, "wind direction")?.rem_euclid(360) as u16,
    };
    let page = integer(&chars, PAGE, "flash page")?;
    if !(0..PAGES_PER_DAY as i64).contains(&page) {
        return Err(StatusError::BadField {
            field: "flash page",
            value: slice(&chars, PAGE),
        });
    }
    let page = page as u16;

    Ok((record, page))
}

/// Encode a status record back into a frame with the given marker
///
/// Used to build fixtures and simulated station traffic; values outside the
/// field widths are clamped.
pub fn encode_status(record: &StatusRecord, page: u16, marker: char) -> String {
    let tenths = |v: f64| (v * 10.0).round() as i64;
    let unsigned = |v: f64, width: usize| {
        let max = 10i64.pow(width as u32) - 1;
        format!("{:0width$}", tenths(v).clamp(0, max), width = width)
    };
    let signed = |v: f64| format!("{:+04}", tenths(v).clamp(-999, 999));
    let voltage = tenths(record.voltage).clamp(0, 255) as u8 as char;

    format!(
        "({}{}{} {} {} {} {} {} {} {} {} {} {} {} {} {} {:03}{}{:04})",
        record.roof_relay,
        record.aux_relay,
        voltage,
        unsigned(record.rain, 4),
        unsigned(record.cloud, 4),
        unsigned(record.abs_pressure, 5),
        unsigned(record.cal_pressure, 5),
        unsigned(record.pluviometer_current, 4),
        unsigned(record.pluviometer_accumulated, 5),
        unsigned(record.pyranometer, 4),
        encode_freq(record.photometer_frequency),
        signed(record.temperature),
        unsigned(record.humidity, 4),
        signed(record.dew_point),
        unsigned(record.wind_speed, 4),
        unsigned(record.wind_speed_10m, 4),
        record.wind_direction % 360,
        marker,
        page % PAGES_PER_DAY,
    )
}

/// Decode a 5 character encoded photometer frequency into Hz
///
/// The first digit is the decimal exponent offset by 3, the remaining four
/// digits are the mantissa.
pub fn decode_freq(enc: &str) -> Result<f64, StatusError> {
    let bad = || StatusError::BadField {
        field: "photometer frequency",
        value: enc.to_string(),
    };
    let mut chars = enc.chars();
    let exponent = chars
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(bad)? as i32
        - FREQ_EXPONENT_OFFSET;
    let mantissa_str: String = chars.collect();
    if mantissa_str.len() != 4 {
        return Err(bad());
    }
    let mantissa: u32 = mantissa_str.parse().map_err(|_| bad())?;
    Ok(round(mantissa as f64 * 10f64.powi(exponent), 3))
}

/// Encode a frequency in Hz with the best representable mantissa
pub fn encode_freq(frequency: f64) -> String {
    let frequency = frequency.max(0.0);
    for digit in 0..=9 {
        let exponent = digit - FREQ_EXPONENT_OFFSET;
        let mantissa = (frequency / 10f64.powi(exponent)).round();
        if mantissa <= 9999.0 {
            return format!("{}{:04}", digit, mantissa as u32);
        }
    }
    "99999".to_string()
}

/// Convert a photometer frequency into a visual magnitude
///
/// Returns [`MAX_MAGNITUDE`] for non positive frequencies or when the raw
/// result would be negative.
pub fn magnitude(frequency: f64) -> f64 {
    if frequency <= 0.0 {
        return MAX_MAGNITUDE;
    }
    let mv = -(frequency / 230.0 * 1e-6).ln() / 2.5f64.ln();
    if mv < 0.0 {
        MAX_MAGNITUDE
    } else {
        mv
    }
}

fn slice(chars: &[char], range: Range<usize>) -> String {
    chars[range].iter().collect()
}

fn integer(chars: &[char], range: Range<usize>, field: &'static str) -> Result<i64, StatusError> {
    let value = slice(chars, range);
    value.trim().parse::<i64>().map_err(|_| StatusError::BadField {
        field,
        value: value.clone(),
    })
}

fn scaled(chars: &[char], range: Range<usize>, field: &'static str) -> Result<f64, StatusError> {
    Ok(round(integer(chars, range, field)? as f64 * 0.1, 1))
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
