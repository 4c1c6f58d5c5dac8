// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command catalogue of the EMA protocol
//!
//! Numeric calibration constants and thresholds share one get/set shape and
//! are described by a static table keyed by [`Setting`]. Relay modes, switch
//! times, the real time clock, the watchdog and the bulk dumps have their own
//! constructors.
//!
//! ## Numeric settings
//!
//! | Setting                 | Get   | Set          | Scale |
//! |-------------------------|-------|--------------|-------|
//! | Anemometer threshold    | `(w)` | `(Wnnn)`     | 1     |
//! | Anemometer calibration  | `(a)` | `(Annn)`     | 1     |
//! | Barometer height        | `(m)` | `(Mnnnnn)`   | 1     |
//! | Barometer offset        | `(b)` | `(B±nn)`     | 1     |
//! | Cloud sensor threshold  | `(n)` | `(Nnnn)`     | 1     |
//! | Cloud sensor gain       | `(r)` | `(Rnnn)`     | 10    |
//! | Photometer threshold    | `(i)` | `(Innn)`     | 10    |
//! | Photometer offset       | `(i)` | `(I±nn)`     | 10    |
//! | Pluviometer calibration | `(p)` | `(Pnnn)`     | 1     |
//! | Pyranometer gain        | `(j)` | `(Jnnn)`     | 10    |
//! | Pyranometer offset      | `(u)` | `(Unnn)`     | 1     |
//! | Rain sensor threshold   | `(l)` | `(Lnnn)`     | 1     |
//! | Thermometer delta       | `(c)` | `(Cnnn)`     | 1     |
//! | Voltmeter threshold     | `(f)` | `(Fnnn)`     | 10    |
//! | Voltmeter offset        | `(f)` | `(F±nn)`     | 10    |
//! | Watchdog period         | `(t)` | `(Tnnn)`     | 1     |

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use super::bulk::BulkDump;
use super::command::{Command, Extract};
use super::error::ProtocolError;
use super::interval::TimeoutPolicy;
use super::status::{MARKER_AVERAGE, MARKER_MAX, MARKER_MIN};

const PHOTOMETER_REPLIES: &[&str] = &[r"^\(I(\d{3})\)$", r"^\(I([+-]\d{2})\)$", r"^\(I(\d{5})\)$"];
const VOLTMETER_REPLIES: &[&str] = &[r"^\(F(\d{3})\)$", r"^\(F([+-]\d{2})\)$", r"^\(F(\d{4})\)$"];
const AUX_RELAY_REPLIES: &[&str] = &[r"^\(S(\d{3})\)$", r"^\(Son(\d{4})\)$", r"^\(Sof(\d{4})\)$"];

const DATETIME_REPLY: &str = r"^\((\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4})\)$";

/// Timeout policy of the daily min/max dump
pub const MIN_MAX_TIMEOUT: TimeoutPolicy =
    TimeoutPolicy::new(Duration::from_secs(60), Duration::from_secs(120), 2);

/// Timeout policy of the five minute averages dump
pub const AVERAGES_TIMEOUT: TimeoutPolicy =
    TimeoutPolicy::new(Duration::from_secs(180), Duration::from_secs(360), 2);

/// Value encoding of a set request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Zero padded unsigned integer of the given width
    Unsigned(usize),
    /// Sign forced integer, width includes the sign
    Signed(usize),
}

impl Encoding {
    /// Smallest and largest integers that fit the field
    fn bounds(self) -> (i64, i64) {
        match self {
            Encoding::Unsigned(width) => (0, 10i64.pow(width as u32) - 1),
            Encoding::Signed(width) => {
                let max = 10i64.pow(width as u32 - 1) - 1;
                (-max, max)
            }
        }
    }

    fn format(self, value: i64) -> String {
        match self {
            Encoding::Unsigned(width) => format!("{:0width$}", value, width = width),
            Encoding::Signed(width) => format!("{:+0width$}", value, width = width),
        }
    }
}

/// Static description of a numeric setting
struct SettingSpec {
    name: &'static str,
    get_request: &'static str,
    get_replies: &'static [&'static str],
    get_ack_index: usize,
    set_prefix: &'static str,
    set_encoding: Encoding,
    set_reply: &'static str,
    scale: f64,
}

impl SettingSpec {
    /// Physical values accepted by the set request
    fn range(&self) -> RangeInclusive<f64> {
        let (min, max) = self.set_encoding.bounds();
        min as f64 / self.scale..=max as f64 / self.scale
    }
}

/// Numeric calibration constants and thresholds of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Setting {
    AnemometerThreshold,
    AnemometerCalibration,
    BarometerHeight,
    BarometerOffset,
    CloudThreshold,
    CloudGain,
    PhotometerThreshold,
    PhotometerOffset,
    PluviometerCalibration,
    PyranometerGain,
    PyranometerOffset,
    RainThreshold,
    ThermometerDeltaThreshold,
    VoltmeterThreshold,
    VoltmeterOffset,
    WatchdogPeriod,
}

/// Single-reply setting whose set request is echoed back
fn simple(
    name: &'static str,
    get_request: &'static str,
    set_prefix: &'static str,
    set_encoding: Encoding,
    replies: &'static [&'static str],
    scale: f64,
) -> SettingSpec {
    SettingSpec {
        name,
        get_request,
        get_replies: replies,
        get_ack_index: 0,
        set_prefix,
        set_encoding,
        set_reply: replies[0],
        scale,
    }
}

impl Setting {
    pub const ALL: [Setting; 16] = [
        Setting::AnemometerThreshold,
        Setting::AnemometerCalibration,
        Setting::BarometerHeight,
        Setting::BarometerOffset,
        Setting::CloudThreshold,
        Setting::CloudGain,
        Setting::PhotometerThreshold,
        Setting::PhotometerOffset,
        Setting::PluviometerCalibration,
        Setting::PyranometerGain,
        Setting::PyranometerOffset,
        Setting::RainThreshold,
        Setting::ThermometerDeltaThreshold,
        Setting::VoltmeterThreshold,
        Setting::VoltmeterOffset,
        Setting::WatchdogPeriod,
    ];

    fn spec(self) -> SettingSpec {
        use Encoding::{Signed, Unsigned};
        match self {
            Setting::AnemometerThreshold => simple("anemometer threshold", "(w)", "W", Unsigned(3), &[r"^\(W(\d{3})\)$"], 1.0),
            Setting::AnemometerCalibration => simple("anemometer calibration", "(a)", "A", Unsigned(3), &[r"^\(A(\d{3})\)$"], 1.0),
            Setting::BarometerHeight => simple("barometer height", "(m)", "M", Unsigned(5), &[r"^\(M(\d{5})\)$"], 1.0),
            Setting::BarometerOffset => simple("barometer offset", "(b)", "B", Signed(3), &[r"^\(B([+-]\d{2})\)$"], 1.0),
            Setting::CloudThreshold => simple("cloud sensor threshold", "(n)", "N", Unsigned(3), &[r"^\(N(\d{3})\)$"], 1.0),
            Setting::CloudGain => simple("cloud sensor gain", "(r)", "R", Unsigned(3), &[r"^\(R(\d{3})\)$"], 10.0),
            Setting::PluviometerCalibration => simple("pluviometer calibration", "(p)", "P", Unsigned(3), &[r"^\(P(\d{3})\)$"], 1.0),
            Setting::PyranometerGain => simple("pyranometer gain", "(j)", "J", Unsigned(3), &[r"^\(J(\d{3})\)$"], 10.0),
            Setting::PyranometerOffset => simple("pyranometer offset", "(u)", "U", Unsigned(3), &[r"^\(U(\d{3})\)$"], 1.0),
            Setting::RainThreshold => simple("rain sensor threshold", "(l)", "L", Unsigned(3), &[r"^\(L(\d{3})\)$"], 1.0),
            Setting::ThermometerDeltaThreshold => simple("thermometer delta threshold", "(c)", "C", Unsigned(3), &[r"^\(C(\d{3})\)$"], 1.0),
            Setting::WatchdogPeriod => simple("watchdog period", "(t)", "T", Unsigned(3), &[r"^\(T(\d{3})\)$"], 1.0),
            Setting::PhotometerThreshold => SettingSpec {
                name: "photometer threshold",
                get_request: "(i)",
                get_replies: PHOTOMETER_REPLIES,
                get_ack_index: 0,
                set_prefix: "I",
                set_encoding: Unsigned(3),
                set_reply: PHOTOMETER_REPLIES[0],
                scale: 10.0,
            },
            Setting::PhotometerOffset => SettingSpec {
                name: "photometer offset",
                get_request: "(i)",
                get_replies: PHOTOMETER_REPLIES,
                get_ack_index: 1,
                set_prefix: "I",
                set_encoding: Signed(3),
                set_reply: PHOTOMETER_REPLIES[1],
                scale: 10.0,
            },
            Setting::VoltmeterThreshold => SettingSpec {
                name: "voltmeter threshold",
                get_request: "(f)",
                get_replies: VOLTMETER_REPLIES,
                get_ack_index: 0,
                set_prefix: "F",
                set_encoding: Unsigned(3),
                set_reply: VOLTMETER_REPLIES[0],
                scale: 10.0,
            },
            Setting::VoltmeterOffset => SettingSpec {
                name: "voltmeter offset",
                get_request: "(f)",
                get_replies: VOLTMETER_REPLIES,
                get_ack_index: 1,
                set_prefix: "F",
                set_encoding: Signed(3),
                set_reply: VOLTMETER_REPLIES[1],
                scale: 10.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Values [`set`] accepts, in physical units
    pub fn range(self) -> RangeInclusive<f64> {
        self.spec().range()
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Setting {
    type Err = String;

    /// Accepts the kebab-case form, e.g. `photometer-threshold`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown setting '{}'", s))
    }
}

/// Read a numeric setting
pub fn get(setting: Setting) -> Result<Command, ProtocolError> {
    let spec = setting.spec();
    Command::builder(format!("get {}", spec.name), spec.get_request)
        .patterns(spec.get_replies)
        .ack_index(spec.get_ack_index)
        .scaled(spec.scale)
        .build()
}

/// Write a numeric setting, `value` is in physical units
///
/// The scaled value is rounded to the nearest integer. Values that do not fit
/// the fixed-width field are rejected before anything is sent.
pub fn set(setting: Setting, value: f64) -> Result<Command, ProtocolError> {
    let spec = setting.spec();
    let (min, max) = spec.set_encoding.bounds();
    let scaled = (value * spec.scale).round();
    if !scaled.is_finite() || scaled < min as f64 || scaled > max as f64 {
        let range = spec.range();
        return Err(ProtocolError::Range {
            setting: spec.name,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    let request = format!("({}{})", spec.set_prefix, spec.set_encoding.format(scaled as i64));
    Command::builder(format!("set {}", spec.name), request)
        .pattern(spec.set_reply)
        .scaled(spec.scale)
        .build()
}

/// A named mode with a fixed wire code and set confirmation
pub trait RelayMode: Copy {
    const TABLE: &'static [(i64, &'static str)];

    fn code(self) -> i64;

    /// Confirmation line expected after the echo of a set request
    fn confirmation(self) -> &'static str;

    fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(code, _)| *code == self.code())
            .map_or("Unknown", |(_, name)| name)
    }
}

/// Roof relay modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofRelayMode {
    Closed,
    Auto,
    Open,
}

impl RelayMode for RoofRelayMode {
    const TABLE: &'static [(i64, &'static str)] = &[(0, "Closed"), (1, "Auto"), (7, "Open")];

    fn code(self) -> i64 {
        match self {
            RoofRelayMode::Closed => 0,
            RoofRelayMode::Auto => 1,
            RoofRelayMode::Open => 7,
        }
    }

    fn confirmation(self) -> &'static str {
        match self {
            RoofRelayMode::Closed => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Cerrar Obs\.\)$",
            RoofRelayMode::Auto => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Modo AUTO\)$",
            RoofRelayMode::Open => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Abrir Obs\. FORZADO\)$",
        }
    }
}

/// Auxiliary relay modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxRelayMode {
    Auto,
    Closed,
    Open,
    TimerOff,
    TimerOn,
}

impl RelayMode for AuxRelayMode {
    const TABLE: &'static [(i64, &'static str)] = &[
        (0, "Auto"),
        (4, "Closed"),
        (5, "Open"),
        (8, "Timer/Off"),
        (9, "Timer/On"),
    ];

    fn code(self) -> i64 {
        match self {
            AuxRelayMode::Auto => 0,
            AuxRelayMode::Closed => 4,
            AuxRelayMode::Open => 5,
            AuxRelayMode::TimerOff => 8,
            AuxRelayMode::TimerOn => 9,
        }
    }

    fn confirmation(self) -> &'static str {
        match self {
            AuxRelayMode::Auto => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Switch AUTO\)$",
            AuxRelayMode::Closed => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Switch OFF\)$",
            AuxRelayMode::Open => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Switch ON\)$",
            AuxRelayMode::TimerOff => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer OFF\)$",
            AuxRelayMode::TimerOn => r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer ON\)$",
        }
    }
}

impl FromStr for AuxRelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AuxRelayMode::Auto,
            AuxRelayMode::Closed,
            AuxRelayMode::Open,
            AuxRelayMode::TimerOff,
            AuxRelayMode::TimerOn,
        ]
        .into_iter()
        .find(|mode| mode.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown aux relay mode '{}'", s))
    }
}

impl FromStr for RoofRelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [RoofRelayMode::Closed, RoofRelayMode::Auto, RoofRelayMode::Open]
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown roof relay mode '{}'", s))
    }
}

/// Anemometer hardware models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnemometerModel {
    Simple,
    Tx20,
}

const ANEMOMETER_MODELS: &[(i64, &str)] = &[(0, "Simple"), (1, "TX20")];

/// Set the roof relay mode
///
/// The second acknowledgement is the confirmation text of the target mode.
pub fn set_roof_relay_mode(mode: RoofRelayMode) -> Result<Command, ProtocolError> {
    Command::builder("set roof relay mode", format!("(X{:03})", mode.code()))
        .pattern(r"^\(X(\d{3})\)$")
        .pattern(mode.confirmation())
        .extract(Extract::Mapped(RoofRelayMode::TABLE))
        .build()
}

/// Read the aux relay mode and both switch times in one exchange
pub fn get_aux_relay() -> Result<Command, ProtocolError> {
    Command::builder("get aux relay", "(s)")
        .patterns(AUX_RELAY_REPLIES)
        .extract(Extract::AuxRelay(AuxRelayMode::TABLE))
        .build()
}

pub fn get_aux_relay_mode() -> Result<Command, ProtocolError> {
    Command::builder("get aux relay mode", "(s)")
        .patterns(AUX_RELAY_REPLIES)
        .ack_index(0)
        .extract(Extract::Mapped(AuxRelayMode::TABLE))
        .build()
}

/// Set the auxiliary relay mode
///
/// The second acknowledgement is the confirmation text of the target mode.
pub fn set_aux_relay_mode(mode: AuxRelayMode) -> Result<Command, ProtocolError> {
    Command::builder("set aux relay mode", format!("(S{:03})", mode.code()))
        .pattern(r"^\(S(\d{3})\)$")
        .pattern(mode.confirmation())
        .extract(Extract::Mapped(AuxRelayMode::TABLE))
        .build()
}

pub fn get_aux_switch_on_time() -> Result<Command, ProtocolError> {
    Command::builder("get aux relay switch-on time", "(s)")
        .patterns(AUX_RELAY_REPLIES)
        .ack_index(1)
        .extract(Extract::HourMinute)
        .build()
}

pub fn set_aux_switch_on_time(time: NaiveTime) -> Result<Command, ProtocolError> {
    Command::builder(
        "set aux relay switch-on time",
        format!("(Son{})", time.format("%H%M")),
    )
    .pattern(AUX_RELAY_REPLIES[1])
    .extract(Extract::HourMinute)
    .build()
}

pub fn get_aux_switch_off_time() -> Result<Command, ProtocolError> {
    Command::builder("get aux relay switch-off time", "(s)")
        .patterns(AUX_RELAY_REPLIES)
        .ack_index(2)
        .extract(Extract::HourMinute)
        .build()
}

pub fn set_aux_switch_off_time(time: NaiveTime) -> Result<Command, ProtocolError> {
    Command::builder(
        "set aux relay switch-off time",
        format!("(Sof{})", time.format("%H%M")),
    )
    .pattern(AUX_RELAY_REPLIES[2])
    .extract(Extract::HourMinute)
    .build()
}

pub fn get_anemometer_model() -> Result<Command, ProtocolError> {
    Command::builder("get anemometer model", "(z)")
        .pattern(r"^\(Z(\d{3})\)$")
        .extract(Extract::Mapped(ANEMOMETER_MODELS))
        .build()
}

pub fn set_anemometer_model(model: AnemometerModel) -> Result<Command, ProtocolError> {
    let code = match model {
        AnemometerModel::Simple => 0,
        AnemometerModel::Tx20 => 1,
    };
    Command::builder("set anemometer model", format!("(Z{:03})", code))
        .pattern(r"^\(Z(\d{3})\)$")
        .extract(Extract::Mapped(ANEMOMETER_MODELS))
        .build()
}

pub fn get_rtc() -> Result<Command, ProtocolError> {
    Command::builder("get real time clock", "(y)")
        .pattern(DATETIME_REPLY)
        .extract(Extract::DateTime)
        .build()
}

/// Set the station clock, the reply echoes the new date and time
pub fn set_rtc(datetime: NaiveDateTime) -> Result<Command, ProtocolError> {
    Command::builder(
        "set real time clock",
        format!("(Y{})", datetime.format("%d%m%y%H%M%S")),
    )
    .pattern(DATETIME_REPLY)
    .extract(Extract::DateTime)
    .build()
}

/// Keep-alive telling the station watchdog the host is present
pub fn ping() -> Result<Command, ProtocolError> {
    Command::builder("watchdog presence", "( )")
        .pattern(r"^\( \)$")
        .extract(Extract::Ack)
        .build()
}

/// Hourly maxima and minima of the last 24 hours
pub fn daily_min_max_dump() -> Result<Command, ProtocolError> {
    Command::builder("daily min/max dump", "(@H0300)")
        .pattern(dump_line_pattern(MARKER_MAX))
        .pattern(dump_line_pattern(MARKER_MIN))
        .pattern(DATETIME_REPLY)
        .timeout(MIN_MAX_TIMEOUT)
        .retries(1)
        .bulk(BulkDump::daily_min_max())
        .build()
}

/// Five minute averages of the last 24 hours
pub fn five_minute_averages_dump() -> Result<Command, ProtocolError> {
    Command::builder("five minute averages dump", "(@t0000)")
        .pattern(dump_line_pattern(MARKER_AVERAGE))
        .timeout(AVERAGES_TIMEOUT)
        .retries(1)
        .bulk(BulkDump::five_minute_averages())
        .build()
}

/// Status-shaped dump line pattern for a record marker
fn dump_line_pattern(marker: char) -> &'static str {
    match marker {
        MARKER_MAX => r"^\(.{76}M\d{4}\)$",
        MARKER_MIN => r"^\(.{76}m\d{4}\)$",
        _ => r"^\(.{76}t\d{4}\)$",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{AuxRelaySettings, Progress, DATETIME_FORMAT};
    use crate::protocol::Value;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("12:34:56 20/06/2016", DATETIME_FORMAT).unwrap()
    }

    fn run(mut cmd: Command, frames: &[&str]) -> Value {
        for (i, frame) in frames.iter().enumerate() {
            let progress = cmd.decode(frame);
            assert!(progress.handled, "{} rejected {}", cmd.name(), frame);
            assert_eq!(progress.finished, i == frames.len() - 1);
        }
        cmd.result(now()).unwrap()
    }

    #[test]
    fn test_every_catalogue_command_builds() {
        for setting in Setting::ALL {
            assert!(!get(setting).unwrap().patterns().is_empty());
            assert!(!set(setting, 1.0).unwrap().patterns().is_empty());
        }
        set_roof_relay_mode(RoofRelayMode::Open).unwrap();
        set_aux_relay_mode(AuxRelayMode::TimerOn).unwrap();
        daily_min_max_dump().unwrap();
        five_minute_averages_dump().unwrap();
    }

    #[test]
    fn test_photometer_threshold_get() {
        let cmd = get(Setting::PhotometerThreshold).unwrap();
        assert_eq!(cmd.request(), "(i)");
        assert_eq!(run(cmd, &["(I105)", "(I+00)", "(I00100)"]), Value::Number(10.5));
    }

    #[test]
    fn test_voltmeter_offset_get() {
        let cmd = get(Setting::VoltmeterOffset).unwrap();
        assert_eq!(cmd.request(), "(f)");
        assert_eq!(run(cmd, &["(F145)", "(F-03)", "(F0120)"]), Value::Number(-0.3));
    }

    #[test]
    fn test_set_encodings() {
        assert_eq!(set(Setting::PhotometerThreshold, 10.5).unwrap().request(), "(I105)");
        assert_eq!(set(Setting::VoltmeterOffset, 0.5).unwrap().request(), "(F+05)");
        assert_eq!(set(Setting::VoltmeterOffset, -1.2).unwrap().request(), "(F-12)");
        assert_eq!(set(Setting::BarometerHeight, 650.0).unwrap().request(), "(M00650)");
        assert_eq!(set(Setting::BarometerOffset, -3.0).unwrap().request(), "(B-03)");
        assert_eq!(set(Setting::CloudGain, 2.3).unwrap().request(), "(R023)");
    }

    #[test]
    fn test_set_rejects_values_outside_the_field() {
        assert!(matches!(
            set(Setting::RainThreshold, -5.0),
            Err(ProtocolError::Range {
                setting: "rain sensor threshold",
                ..
            })
        ));
        assert!(matches!(
            set(Setting::BarometerHeight, 123456.0),
            Err(ProtocolError::Range { max, .. }) if max == 99999.0
        ));
        assert!(matches!(
            set(Setting::VoltmeterOffset, -10.0),
            Err(ProtocolError::Range { min, .. }) if min == -9.9
        ));
        assert!(set(Setting::CloudGain, f64::NAN).is_err());
        assert_eq!(set(Setting::BarometerHeight, 99999.0).unwrap().request(), "(M99999)");
        assert_eq!(set(Setting::VoltmeterOffset, -9.9).unwrap().request(), "(F-99)");
        assert_eq!(set(Setting::RainThreshold, 0.0).unwrap().request(), "(L000)");
    }

    #[test]
    fn test_setting_ranges() {
        assert_eq!(Setting::RainThreshold.range(), 0.0..=999.0);
        assert_eq!(Setting::PhotometerThreshold.range(), 0.0..=99.9);
        assert_eq!(Setting::BarometerOffset.range(), -99.0..=99.0);
    }

    #[test]
    fn test_set_echo_returns_value() {
        let cmd = set(Setting::AnemometerThreshold, 20.0).unwrap();
        assert_eq!(cmd.request(), "(W020)");
        assert_eq!(run(cmd, &["(W020)"]), Value::Number(20.0));
    }

    #[test]
    fn test_set_aux_relay_timer_on() {
        let cmd = set_aux_relay_mode(AuxRelayMode::TimerOn).unwrap();
        assert_eq!(cmd.request(), "(S009)");
        assert_eq!(
            run(cmd, &["(S009)", "(12:34:56 20/06/2016 Timer ON)"]),
            Value::Text("Timer/On".into())
        );
    }

    #[test]
    fn test_confirmation_depends_on_target() {
        let mut cmd = set_aux_relay_mode(AuxRelayMode::TimerOff).unwrap();
        assert_eq!(cmd.decode("(S008)"), Progress::PARTIAL);
        assert_eq!(cmd.decode("(12:34:56 20/06/2016 Timer ON)"), Progress::UNHANDLED);
        assert_eq!(cmd.decode("(12:34:56 20/06/2016 Timer OFF)"), Progress::FINISHED);
    }

    #[test]
    fn test_set_roof_relay_open() {
        let cmd = set_roof_relay_mode(RoofRelayMode::Open).unwrap();
        assert_eq!(cmd.request(), "(X007)");
        assert_eq!(
            run(cmd, &["(X007)", "(12:34:56 20/06/2016 Abrir Obs. FORZADO)"]),
            Value::Text("Open".into())
        );
    }

    #[test]
    fn test_aux_relay_get_family() {
        let replies = ["(S005)", "(Son0930)", "(Sof2300)"];
        assert_eq!(run(get_aux_relay_mode().unwrap(), &replies), Value::Text("Open".into()));
        assert_eq!(
            run(get_aux_switch_on_time().unwrap(), &replies),
            Value::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        );
        assert_eq!(
            run(get_aux_switch_off_time().unwrap(), &replies),
            Value::Time(NaiveTime::from_hms_opt(23, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_aux_relay_read_at_once() {
        let cmd = get_aux_relay().unwrap();
        assert_eq!(cmd.request(), "(s)");
        assert_eq!(
            run(cmd, &["(S009)", "(Son2030)", "(Sof0615)"]),
            Value::AuxRelay(AuxRelaySettings {
                mode: "Timer/On".into(),
                switch_on: NaiveTime::from_hms_opt(20, 30, 0).unwrap(),
                switch_off: NaiveTime::from_hms_opt(6, 15, 0).unwrap(),
            })
        );
    }

    #[test]
    fn test_switch_time_set() {
        let cmd = set_aux_switch_on_time(NaiveTime::from_hms_opt(6, 15, 0).unwrap()).unwrap();
        assert_eq!(cmd.request(), "(Son0615)");
        assert_eq!(
            run(cmd, &["(Son0615)"]),
            Value::Time(NaiveTime::from_hms_opt(6, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_rtc_set() {
        let cmd = set_rtc(now()).unwrap();
        assert_eq!(cmd.request(), "(Y200616123456)");
        assert_eq!(run(cmd, &["(12:34:56 20/06/2016)"]), Value::DateTime(now()));
    }

    #[test]
    fn test_ping() {
        let cmd = ping().unwrap();
        assert_eq!(cmd.request(), "( )");
        assert_eq!(run(cmd, &["( )"]), Value::Ack);
    }

    #[test]
    fn test_anemometer_model() {
        let cmd = set_anemometer_model(AnemometerModel::Tx20).unwrap();
        assert_eq!(cmd.request(), "(Z001)");
        assert_eq!(run(cmd, &["(Z001)"]), Value::Text("TX20".into()));
    }

    #[test]
    fn test_dump_policies() {
        let cmd = five_minute_averages_dump().unwrap();
        assert_eq!(cmd.request(), "(@t0000)");
        assert_eq!(cmd.timeout(), AVERAGES_TIMEOUT);
        assert_eq!(cmd.default_retries(), 1);
        assert_eq!(daily_min_max_dump().unwrap().request(), "(@H0300)");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("photometer-threshold".parse(), Ok(Setting::PhotometerThreshold));
        assert_eq!("Timer/On".parse(), Ok(AuxRelayMode::TimerOn));
        assert_eq!("open".parse(), Ok(RoofRelayMode::Open));
        assert!("bogus".parse::<Setting>().is_err());
    }
}
