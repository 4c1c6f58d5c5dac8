// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Incremental selection of bulk dump entries
//!
//! Each dump returns the whole last day. A client polling it periodically
//! only wants what it has not stored yet, plus a configurable overlap so a
//! record rewritten by the station since the previous poll is picked up again.

use chrono::{Duration, NaiveDateTime};

use crate::protocol::bulk::{AverageEntry, DumpKind, MinMaxEntry, PAGE_MINUTES};

/// Dump entry carrying its own timestamp
pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;
}

impl Timestamped for MinMaxEntry {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl Timestamped for AverageEntry {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpFilter {
    period: Duration,
    overlap_percent: u32,
}

impl DumpFilter {
    /// `period` is the spacing of the dump's records
    pub fn new(period: Duration, overlap_percent: u32) -> Self {
        Self {
            period,
            overlap_percent,
        }
    }

    /// Filter matching the record spacing of a dump kind
    pub fn for_kind(kind: DumpKind, overlap_percent: u32) -> Self {
        let period = match kind {
            DumpKind::DailyMinMax => Duration::hours(1),
            DumpKind::FiveMinuteAverages => Duration::minutes(PAGE_MINUTES as i64),
        };
        Self::new(period, overlap_percent)
    }

    /// Oldest timestamp still returned after `last_seen`
    pub fn cutoff(&self, last_seen: NaiveDateTime) -> NaiveDateTime {
        last_seen - self.period * self.overlap_percent as i32 / 100
    }

    /// Entries newer than the cutoff, and the new `last_seen`
    ///
    /// Without `last_seen` everything is returned. The new `last_seen` is the
    /// newest timestamp in the dump, or the previous one for an empty dump.
    pub fn filter<E>(
        &self,
        entries: &[E],
        last_seen: Option<NaiveDateTime>,
    ) -> (Vec<E>, Option<NaiveDateTime>)
    where
        E: Timestamped + Clone,
    {
        let newest = entries.iter().map(Timestamped::timestamp).max();
        let selected = match last_seen {
            None => entries.to_vec(),
            Some(seen) => {
                let cutoff = self.cutoff(seen);
                entries
                    .iter()
                    .filter(|entry| entry.timestamp() > cutoff)
                    .cloned()
                    .collect()
            }
        };
        (selected, newest.max(last_seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::DATETIME_FORMAT;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(NaiveDateTime);

    impl Timestamped for Entry {
        fn timestamp(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    fn hourly() -> Vec<Entry> {
        (0..24)
            .map(|h| Entry(at("00:00:00 20/06/2016") + Duration::hours(h)))
            .collect()
    }

    #[test]
    fn test_without_last_seen_returns_everything() {
        let filter = DumpFilter::for_kind(DumpKind::DailyMinMax, 0);
        let (selected, last) = filter.filter(&hourly(), None);
        assert_eq!(selected.len(), 24);
        assert_eq!(last, Some(at("23:00:00 20/06/2016")));
    }

    #[test]
    fn test_only_newer_entries() {
        let filter = DumpFilter::for_kind(DumpKind::DailyMinMax, 0);
        let (selected, last) = filter.filter(&hourly(), Some(at("20:00:00 20/06/2016")));
        assert_eq!(
            selected,
            vec![
                Entry(at("21:00:00 20/06/2016")),
                Entry(at("22:00:00 20/06/2016")),
                Entry(at("23:00:00 20/06/2016")),
            ]
        );
        assert_eq!(last, Some(at("23:00:00 20/06/2016")));
    }

    #[test]
    fn test_overlap_reaches_back() {
        let filter = DumpFilter::for_kind(DumpKind::DailyMinMax, 200);
        assert_eq!(
            filter.cutoff(at("20:00:00 20/06/2016")),
            at("18:00:00 20/06/2016")
        );
        let (selected, _) = filter.filter(&hourly(), Some(at("20:00:00 20/06/2016")));
        assert_eq!(selected.len(), 5);

        let five = DumpFilter::for_kind(DumpKind::FiveMinuteAverages, 50);
        assert_eq!(
            five.cutoff(at("20:00:00 20/06/2016")),
            at("19:57:30 20/06/2016")
        );
    }

    #[test]
    fn test_empty_dump_keeps_last_seen() {
        let filter = DumpFilter::new(Duration::minutes(5), 0);
        let seen = Some(at("20:00:00 20/06/2016"));
        let (selected, last) = filter.filter::<Entry>(&[], seen);
        assert!(selected.is_empty());
        assert_eq!(last, seen);
    }
}
