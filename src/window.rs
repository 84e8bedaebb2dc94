// src/window.rs

use crate::error::{Error, Result};
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

const BUILD_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// A reference date as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    Today,
    Yesterday,
    Day(NaiveDate),
}

impl DateSpec {
    /// Resolves against the current UTC date.
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            DateSpec::Today => today,
            DateSpec::Yesterday => today - Duration::days(1),
            DateSpec::Day(date) => date,
        }
    }
}

impl FromStr for DateSpec {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "today" => Ok(DateSpec::Today),
            "yesterday" => Ok(DateSpec::Yesterday),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(DateSpec::Day)
                .map_err(|_| Error::InvalidDate(raw.to_string())),
        }
    }
}

/// `YYYYMMDDhhmmss`, minted in the reporting timezone when a build is released
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildId(String);

impl BuildId {
    pub fn at(date: &DateTime<FixedOffset>) -> Self {
        BuildId(date.format(BUILD_ID_FORMAT).to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDateTime::parse_from_str(raw, BUILD_ID_FORMAT).ok()?;
        Some(BuildId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant this build was minted, reading the id in `offset`.
    pub fn instant(&self, offset: &FixedOffset) -> Option<DateTime<Utc>> {
        let local = NaiveDateTime::parse_from_str(&self.0, BUILD_ID_FORMAT).ok()?;
        offset
            .from_local_datetime(&local)
            .single()
            .map(|date| date.with_timezone(&Utc))
    }

    /// The UTC calendar day a build's counts are bucketed into.
    pub fn utc_date(&self, offset: &FixedOffset) -> Option<NaiveDate> {
        self.instant(offset).map(|instant| instant.date_naive())
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The build and calendar ranges a run looks at.
///
/// Build ids are half-open `[start_build, end_build)`, both boundaries being
/// local midnights in the reporting timezone. Counts are bucketed per UTC day
/// over `[start_date, start_date + lookback_days]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub reference: NaiveDate,
    pub lookback_days: u32,
    pub offset: FixedOffset,
    pub start_build: BuildId,
    pub end_build: BuildId,
    /// Start of the last build day, used to sample crashes of the spike itself
    pub recent_start_build: BuildId,
    pub start_date: NaiveDate,
    /// Upper bound of the patch history search: midnight UTC of the reference date
    pub history_until: DateTime<Utc>,
}

impl Window {
    pub fn resolve(reference: NaiveDate, lookback_days: u32, offset: FixedOffset) -> Result<Window> {
        let midnight = reference
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidDate(reference.to_string()))?;
        let end_local = offset
            .from_local_datetime(&midnight)
            .single()
            .ok_or_else(|| Error::InvalidDate(reference.to_string()))?;
        let start_local = Duration::try_days(i64::from(lookback_days) + 1)
            .and_then(|span| end_local.checked_sub_signed(span))
            .ok_or(Error::InvalidLookback(lookback_days))?;
        let recent_local = Duration::try_days(1)
            .and_then(|day| end_local.checked_sub_signed(day))
            .ok_or_else(|| Error::InvalidDate(reference.to_string()))?;
        let start_date = start_local.with_timezone(&Utc).date_naive();
        // days() and last_day() stay in range from here on
        start_date
            .checked_add_days(Days::new(u64::from(lookback_days)))
            .ok_or(Error::InvalidLookback(lookback_days))?;

        Ok(Window {
            reference,
            lookback_days,
            offset,
            start_build: BuildId::at(&start_local),
            end_build: BuildId::at(&end_local),
            recent_start_build: BuildId::at(&recent_local),
            start_date,
            history_until: Utc.from_utc_datetime(&midnight),
        })
    }

    /// Every bucket day, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..=i64::from(self.lookback_days)).map(move |i| self.start_date + Duration::days(i))
    }

    pub fn last_day(&self) -> NaiveDate {
        self.start_date + Duration::days(i64::from(self.lookback_days))
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        day >= self.start_date && day <= self.last_day()
    }

    /// History reaches back to `start_date`.
    pub fn history_lookback_days(&self) -> u32 {
        self.lookback_days + 1
    }
}
