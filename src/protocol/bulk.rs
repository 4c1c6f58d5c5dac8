// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bulk dump commands
//!
//! A bulk dump asks the station to stream its onboard flash history. Every
//! record repeats the same short response sequence, so a dump is a regular
//! [`Command`](super::Command) whose pattern list is replayed `iterations`
//! times:
//!
//! - Daily min/max: 24 iterations of (max status line, min status line,
//!   timestamp line)
//! - Five minute averages: 288 iterations of a single status line whose
//!   timestamp is derived from its flash page

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use log::debug;
use serde::Serialize;

use super::command::DATETIME_FORMAT;
use super::error::ProtocolError;
use super::status::{decode_status, StatusRecord, PAGES_PER_DAY};

/// Minutes covered by one flash page
pub const PAGE_MINUTES: u32 = 5;

/// Iterations of the daily min/max dump
pub const MIN_MAX_ITERATIONS: usize = 24;

/// Iterations of the five minute averages dump
pub const AVERAGE_ITERATIONS: usize = PAGES_PER_DAY as usize;

/// Flash page holding the five minute window that contains `time`
pub fn to_page(time: NaiveTime) -> u16 {
    ((time.hour() * 60 + time.minute()) / PAGE_MINUTES) as u16
}

/// Start of the five minute window stored in `page`
pub fn to_time(page: u16) -> NaiveTime {
    let minutes = (page % PAGES_PER_DAY) as i64 * PAGE_MINUTES as i64;
    NaiveTime::default() + Duration::minutes(minutes)
}

/// Timestamp of a five minute record read back at `now`
///
/// Pages after the current one belong to today, every other page to
/// yesterday. Records are stamped at the end of their window, so the last
/// page of a day carries into the next midnight.
pub fn page_timestamp(page: u16, now: NaiveDateTime) -> NaiveDateTime {
    let current = to_page(now.time());
    let day = if page > current {
        now.date()
    } else {
        now.date() - Duration::days(1)
    };
    day.and_time(to_time(page)) + Duration::minutes(PAGE_MINUTES as i64)
}

/// Kind of history held by a bulk dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    DailyMinMax,
    FiveMinuteAverages,
}

/// One hour of the daily min/max dump
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinMaxEntry {
    pub timestamp: NaiveDateTime,
    pub max: StatusRecord,
    pub min: StatusRecord,
}

/// One five minute average record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageEntry {
    pub timestamp: NaiveDateTime,
    pub page: u16,
    pub record: StatusRecord,
}

/// Iteration bookkeeping of a bulk dump
#[derive(Debug, Clone)]
pub struct BulkDump {
    kind: DumpKind,
    iterations: usize,
    iteration: usize,
    accumulated: Vec<Vec<String>>,
}

impl BulkDump {
    pub fn new(kind: DumpKind, iterations: usize) -> Self {
        Self {
            kind,
            iterations: iterations.max(1),
            iteration: 0,
            accumulated: Vec::with_capacity(iterations),
        }
    }

    pub fn daily_min_max() -> Self {
        Self::new(DumpKind::DailyMinMax, MIN_MAX_ITERATIONS)
    }

    pub fn five_minute_averages() -> Self {
        Self::new(DumpKind::FiveMinuteAverages, AVERAGE_ITERATIONS)
    }

    pub fn kind(&self) -> DumpKind {
        self.kind
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Index of the iteration being received
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Store the responses of a completed iteration
    ///
    /// Returns true when that was the last iteration.
    pub(crate) fn complete_iteration(&mut self, responses: Vec<String>) -> bool {
        self.accumulated.push(responses);
        if self.accumulated.len() >= self.iterations {
            debug!("{:?} dump complete ({} records)", self.kind, self.iterations);
            true
        } else {
            self.iteration += 1;
            false
        }
    }

    pub(crate) fn reset(&mut self) {
        self.iteration = 0;
        self.accumulated.clear();
    }

    pub(crate) fn result(
        &self,
        command: &str,
        now: NaiveDateTime,
    ) -> Result<super::Value, ProtocolError> {
        let status = |frame: &str| {
            decode_status(frame).map_err(|source| ProtocolError::Status {
                command: command.to_string(),
                source,
            })
        };
        let response = |slot: &[String], index: usize| -> Result<String, ProtocolError> {
            slot.get(index)
                .cloned()
                .ok_or_else(|| ProtocolError::MalformedValue {
                    command: command.to_string(),
                    field: "dump record",
                    value: format!("{} line(s)", slot.len()),
                })
        };

        match self.kind {
            DumpKind::DailyMinMax => {
                let mut entries = Vec::with_capacity(self.accumulated.len());
                for slot in &self.accumulated {
                    let (max, _) = status(&response(slot, 0)?)?;
                    let (min, _) = status(&response(slot, 1)?)?;
                    let stamp = response(slot, 2)?;
                    let timestamp = NaiveDateTime::parse_from_str(&stamp, DATETIME_FORMAT)
                        .map_err(|_| ProtocolError::MalformedValue {
                            command: command.to_string(),
                            field: "timestamp",
                            value: stamp.clone(),
                        })?;
                    entries.push(MinMaxEntry {
                        timestamp,
                        max,
                        min,
                    });
                }
                Ok(super::Value::MinMax(entries))
            }
            DumpKind::FiveMinuteAverages => {
                let mut entries = Vec::with_capacity(self.accumulated.len());
                for slot in &self.accumulated {
                    let (record, page) = status(&response(slot, 0)?)?;
                    entries.push(AverageEntry {
                        timestamp: page_timestamp(page, now),
                        page,
                        record,
                    });
                }
                Ok(super::Value::Averages(entries))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::Progress;
    use crate::protocol::commands;
    use crate::protocol::status::tests::GOLDEN;
    use crate::protocol::status::{encode_status, MARKER_AVERAGE, MARKER_MAX, MARKER_MIN};
    use crate::protocol::Value;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    fn line(marker: char, page: u16) -> String {
        let (record, _) = decode_status(GOLDEN).unwrap();
        encode_status(&record, page, marker)
    }

    #[test]
    fn test_page_time_inverse() {
        for page in 0..PAGES_PER_DAY {
            assert_eq!(to_page(to_time(page)), page);
        }
        assert_eq!(to_page(NaiveTime::from_hms_opt(10, 7, 59).unwrap()), 121);
        assert_eq!(to_time(287), NaiveTime::from_hms_opt(23, 55, 0).unwrap());
    }

    #[test]
    fn test_page_timestamp_today_and_yesterday() {
        let now = at("10:02:00 20/06/2016"); // current page 120
        assert_eq!(page_timestamp(0, now), at("00:05:00 19/06/2016"));
        assert_eq!(page_timestamp(119, now), at("10:00:00 19/06/2016"));
        assert_eq!(page_timestamp(120, now), at("10:05:00 19/06/2016"));
        assert_eq!(page_timestamp(121, now), at("10:10:00 20/06/2016"));
        assert_eq!(page_timestamp(200, now).date(), now.date());
        assert_eq!(page_timestamp(200, now), at("16:45:00 20/06/2016"));
    }

    #[test]
    fn test_page_timestamp_carries_into_midnight() {
        let now = at("10:02:00 20/06/2016");
        assert_eq!(page_timestamp(287, now), at("00:00:00 21/06/2016"));
        let late = at("23:57:00 20/06/2016"); // current page 287
        assert_eq!(page_timestamp(287, late), at("00:00:00 20/06/2016"));
        let early = at("00:01:00 20/06/2016"); // current page 0
        assert_eq!(page_timestamp(0, early), at("00:05:00 19/06/2016"));
        assert_eq!(page_timestamp(1, early), at("00:10:00 20/06/2016"));
    }

    #[test]
    fn test_min_max_requires_all_lines() {
        let mut cmd = commands::daily_min_max_dump().unwrap();
        let per_iteration = cmd.patterns().len();
        assert_eq!(per_iteration, 3);
        let mut matched = 0;
        for hour in 0..MIN_MAX_ITERATIONS {
            let stamp = format!("({:02}:00:00 20/06/2016)", hour);
            for frame in [line(MARKER_MAX, 0), line(MARKER_MIN, 0), stamp] {
                let progress = cmd.decode(&frame);
                matched += 1;
                assert!(progress.handled);
                assert_eq!(progress.finished, matched == MIN_MAX_ITERATIONS * per_iteration);
            }
            let bulk = cmd.bulk().unwrap();
            assert_eq!(bulk.iteration(), (hour + 1).min(MIN_MAX_ITERATIONS - 1));
        }

        let Value::MinMax(entries) = cmd.result(at("12:00:00 20/06/2016")).unwrap() else {
            panic!("expected min/max entries");
        };
        assert_eq!(entries.len(), MIN_MAX_ITERATIONS);
        assert_eq!(entries[3].timestamp, at("03:00:00 20/06/2016"));
        assert_eq!(entries[3].max.roof_relay, 'C');
    }

    #[test]
    fn test_min_max_ignores_out_of_order_line() {
        let mut cmd = commands::daily_min_max_dump().unwrap();
        assert_eq!(cmd.decode(&line(MARKER_MIN, 0)), Progress::UNHANDLED);
        assert_eq!(cmd.decode(&line(MARKER_MAX, 0)), Progress::PARTIAL);
        assert_eq!(cmd.decode(GOLDEN), Progress::UNHANDLED);
    }

    #[test]
    fn test_five_minute_dump() {
        let mut cmd = commands::five_minute_averages_dump().unwrap();
        for page in 0..PAGES_PER_DAY {
            let progress = cmd.decode(&line(MARKER_AVERAGE, (page + 121) % PAGES_PER_DAY));
            assert_eq!(progress.finished, page == PAGES_PER_DAY - 1);
        }
        let Value::Averages(entries) = cmd.result(at("10:02:00 20/06/2016")).unwrap() else {
            panic!("expected average entries");
        };
        assert_eq!(entries.len(), AVERAGE_ITERATIONS);
        assert_eq!(entries[0].page, 121);
        assert_eq!(entries[0].timestamp, at("10:10:00 20/06/2016"));
        assert_eq!(entries[166].page, 287);
        assert_eq!(entries[166].timestamp, at("00:00:00 21/06/2016"));
        assert_eq!(entries[280].page, 113);
        assert_eq!(entries[280].timestamp, at("09:30:00 19/06/2016"));
        assert_eq!(entries[287].page, 120);
        assert_eq!(entries[287].timestamp, at("10:05:00 19/06/2016"));
    }

    #[test]
    fn test_reset_restarts_iterations() {
        let mut cmd = commands::five_minute_averages_dump().unwrap();
        for page in 0..10 {
            cmd.decode(&line(MARKER_AVERAGE, page));
        }
        assert_eq!(cmd.bulk().unwrap().iteration(), 10);
        cmd.reset();
        assert_eq!(cmd.bulk().unwrap().iteration(), 0);
        assert_eq!(cmd.cursor(), 0);
    }
}
