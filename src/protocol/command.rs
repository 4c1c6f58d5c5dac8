// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request/response command descriptors
//!
//! A [`Command`] carries everything needed to talk to the station for one
//! request: the encoded request line, the ordered acknowledgement patterns,
//! the index of the value bearing response, how to turn the captured text
//! into a [`Value`], and its own retry/timeout policy. It also owns the decode
//! cursor used while replies trickle in.
//!
//! Bulk dumps reuse the same decode path with a repeating pattern sequence,
//! see [`crate::protocol::bulk`].

use chrono::{NaiveDateTime, NaiveTime};
use log::{debug, trace};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use super::bulk::{AverageEntry, BulkDump, MinMaxEntry};
use super::error::ProtocolError;
use super::interval::TimeoutPolicy;

/// Retry budget used when a command does not declare its own
pub const DEFAULT_RETRIES: u32 = 2;

/// Format of the date/time line sent by the real time clock
pub const DATETIME_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

/// Compile an acknowledgement pattern, sharing compiled instances
pub(crate) fn pattern(re: &'static str) -> Result<Regex, regex::Error> {
    static CACHE: LazyLock<Mutex<HashMap<&'static str, Regex>>> =
        LazyLock::new(|| Mutex::new(HashMap::new()));
    let mut cache = CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(compiled) = cache.get(re) {
        return Ok(compiled.clone());
    }
    let compiled = Regex::new(re)?;
    cache.insert(re, compiled.clone());
    Ok(compiled)
}

/// Value produced by a completed command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Scaled numeric parameter
    Number(f64),
    /// Named mode (relay modes, anemometer model)
    Text(String),
    /// Time of day (relay switch times)
    Time(NaiveTime),
    /// Station clock
    DateTime(NaiveDateTime),
    /// Mode and switch times of the auxiliary relay, read in one exchange
    AuxRelay(AuxRelaySettings),
    /// Bare acknowledgement
    Ack,
    /// 24 hourly entries of a daily min/max dump
    MinMax(Vec<MinMaxEntry>),
    /// 288 entries of a five minute averages dump
    Averages(Vec<AverageEntry>),
}

/// Everything the `(s)` query reports about the auxiliary relay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxRelaySettings {
    pub mode: String,
    pub switch_on: NaiveTime,
    pub switch_off: NaiveTime,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// How the authoritative captured text turns into a [`Value`]
#[derive(Debug, Clone)]
pub enum Extract {
    /// Integer divided by the scale
    Scaled(f64),
    /// Integer code looked up in a name table
    Mapped(&'static [(i64, &'static str)]),
    /// `HHMM` time of day
    HourMinute,
    /// `HH:MM:SS DD/MM/YYYY`
    DateTime,
    /// Matching is all that matters
    Ack,
    /// Mode code then `HHMM` switch-on and switch-off times, one per response
    AuxRelay(&'static [(i64, &'static str)]),
}

/// Outcome of offering one frame to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// The frame belonged to this command
    pub handled: bool,
    /// The command has received everything it expects
    pub finished: bool,
}

impl Progress {
    pub const UNHANDLED: Progress = Progress {
        handled: false,
        finished: false,
    };
    pub const PARTIAL: Progress = Progress {
        handled: true,
        finished: false,
    };
    pub const FINISHED: Progress = Progress {
        handled: true,
        finished: true,
    };
}

/// A request/response exchange with the station
#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    request: String,
    patterns: Vec<Regex>,
    ack_index: usize,
    extract: Extract,
    timeout: TimeoutPolicy,
    retries: u32,
    bulk: Option<BulkDump>,
    // Decode cursor and captured responses, both cleared on retry
    index: usize,
    responses: Vec<String>,
}

impl Command {
    /// Start building a command sending `request`
    pub fn builder(name: impl Into<String>, request: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            request: request.into(),
            patterns: Vec::new(),
            ack_index: 0,
            extract: Extract::Ack,
            timeout: TimeoutPolicy::default(),
            retries: DEFAULT_RETRIES,
            bulk: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoded request line
    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn ack_index(&self) -> usize {
        self.ack_index
    }

    pub fn timeout(&self) -> TimeoutPolicy {
        self.timeout
    }

    pub fn default_retries(&self) -> u32 {
        self.retries
    }

    /// Replace the timeout policy
    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    /// Index of the next expected pattern
    pub fn cursor(&self) -> usize {
        self.index
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    pub fn bulk(&self) -> Option<&BulkDump> {
        self.bulk.as_ref()
    }

    /// Offer an incoming frame to the command
    ///
    /// A frame that does not match the expected pattern leaves the cursor
    /// untouched and reports `handled == false`.
    pub fn decode(&mut self, frame: &str) -> Progress {
        let Some(captures) = self.patterns[self.index].captures(frame) else {
            debug!(
                "'{}' expected pattern #{} ({}), no match",
                self.name, self.index, self.patterns[self.index]
            );
            return Progress::UNHANDLED;
        };
        let captured = captures.get(1).map_or(frame, |m| m.as_str()).to_string();
        trace!("'{}' matched pattern #{}: {}", self.name, self.index, captured);
        self.responses.push(captured);

        if self.index + 1 < self.patterns.len() {
            self.index += 1;
            return Progress::PARTIAL;
        }

        match self.bulk.as_mut() {
            None => Progress::FINISHED,
            Some(bulk) => {
                let finished = bulk.complete_iteration(std::mem::take(&mut self.responses));
                if finished {
                    Progress::FINISHED
                } else {
                    self.index = 0;
                    Progress::PARTIAL
                }
            }
        }
    }

    /// Forget partial replies before a retransmission
    pub fn reset(&mut self) {
        self.index = 0;
        self.responses.clear();
        if let Some(bulk) = self.bulk.as_mut() {
            bulk.reset();
        }
    }

    /// Extract the value of a finished command
    ///
    /// `now` anchors the timestamps of dumps that only carry page numbers.
    pub fn result(&self, now: NaiveDateTime) -> Result<Value, ProtocolError> {
        if let Some(bulk) = &self.bulk {
            return bulk.result(&self.name, now);
        }
        if let Extract::AuxRelay(table) = &self.extract {
            return self.aux_relay(*table);
        }
        self.convert(&self.extract, self.response(self.ack_index)?)
    }

    fn response(&self, index: usize) -> Result<&str, ProtocolError> {
        self.responses
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::MalformedValue {
                command: self.name.clone(),
                field: "response",
                value: format!("{} response(s) received", self.responses.len()),
            })
    }

    fn aux_relay(&self, table: &'static [(i64, &'static str)]) -> Result<Value, ProtocolError> {
        let mode = self.convert(&Extract::Mapped(table), self.response(0)?)?;
        let switch_on = self.convert(&Extract::HourMinute, self.response(1)?)?;
        let switch_off = self.convert(&Extract::HourMinute, self.response(2)?)?;
        match (mode, switch_on, switch_off) {
            (Value::Text(mode), Value::Time(switch_on), Value::Time(switch_off)) => {
                Ok(Value::AuxRelay(AuxRelaySettings {
                    mode,
                    switch_on,
                    switch_off,
                }))
            }
            _ => Err(ProtocolError::MalformedValue {
                command: self.name.clone(),
                field: "aux relay settings",
                value: self.responses.join(" "),
            }),
        }
    }

    fn convert(&self, extract: &Extract, captured: &str) -> Result<Value, ProtocolError> {
        let malformed = |field: &'static str| ProtocolError::MalformedValue {
            command: self.name.clone(),
            field,
            value: captured.to_string(),
        };
        match extract {
            Extract::Scaled(scale) => {
                let raw: i64 = captured.trim().parse().map_err(|_| malformed("number"))?;
                Ok(Value::Number(raw as f64 / scale))
            }
            Extract::Mapped(table) => {
                let raw: i64 = captured.trim().parse().map_err(|_| malformed("code"))?;
                table
                    .iter()
                    .find(|(code, _)| *code == raw)
                    .map(|(_, name)| Value::Text(name.to_string()))
                    .ok_or_else(|| malformed("code"))
            }
            Extract::HourMinute => NaiveTime::parse_from_str(captured, "%H%M")
                .map(Value::Time)
                .map_err(|_| malformed("time")),
            Extract::DateTime => NaiveDateTime::parse_from_str(captured, DATETIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|_| malformed("date/time")),
            Extract::Ack => Ok(Value::Ack),
            Extract::AuxRelay(_) => Err(malformed("aux relay settings")),
        }
    }
}

/// Builder for immutable command descriptors
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    name: String,
    request: String,
    patterns: Vec<&'static str>,
    ack_index: usize,
    extract: Extract,
    timeout: TimeoutPolicy,
    retries: u32,
    bulk: Option<BulkDump>,
}

impl CommandBuilder {
    /// Append an expected acknowledgement pattern
    pub fn pattern(mut self, re: &'static str) -> Self {
        self.patterns.push(re);
        self
    }

    /// Append several expected acknowledgement patterns
    pub fn patterns(mut self, res: &[&'static str]) -> Self {
        self.patterns.extend_from_slice(res);
        self
    }

    /// Response holding the authoritative value
    pub fn ack_index(mut self, index: usize) -> Self {
        self.ack_index = index;
        self
    }

    pub fn extract(mut self, extract: Extract) -> Self {
        self.extract = extract;
        self
    }

    pub fn scaled(self, scale: f64) -> Self {
        self.extract(Extract::Scaled(scale))
    }

    pub fn timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Repeat the pattern sequence as a bulk dump
    pub fn bulk(mut self, bulk: BulkDump) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Compile the patterns and freeze the descriptor
    ///
    /// Fails when no pattern was given, when one does not compile or when
    /// the acknowledgement index points past the last pattern.
    pub fn build(self) -> Result<Command, ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidCommand {
            command: self.name.clone(),
            reason,
        };
        if self.patterns.is_empty() {
            return Err(invalid("no acknowledgement pattern".to_string()));
        }
        if self.ack_index >= self.patterns.len() {
            return Err(invalid(format!(
                "acknowledgement index {} past {} pattern(s)",
                self.ack_index,
                self.patterns.len()
            )));
        }
        let patterns = self
            .patterns
            .iter()
            .map(|re| pattern(*re))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Command {
            name: self.name,
            request: self.request,
            patterns,
            ack_index: self.ack_index,
            extract: self.extract,
            timeout: self.timeout,
            retries: self.retries,
            bulk: self.bulk,
            index: 0,
            responses: Vec::new(),
        })
    }
}
