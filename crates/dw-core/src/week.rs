//! Monday..Sunday week periods and their derived keys.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A week period. `key` is always `"{start}_{end}"` in ISO date form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub key: String,
}

/// Derive the week key from its boundaries.
pub fn week_key(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}_{}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

impl Week {
    /// Build a week from explicit boundaries. Rejects `start > end`.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, DomainError> {
        if start_date > end_date {
            return Err(DomainError::InvalidWeek(format!(
                "start {start_date} is after end {end_date}"
            )));
        }
        Ok(Self {
            start_date,
            end_date,
            key: week_key(start_date, end_date),
        })
    }

    /// The Monday..Sunday week that contains `day`. Fails when that week
    /// reaches past the calendar range chrono can represent.
    pub fn containing(day: NaiveDate) -> Result<Self, DomainError> {
        let offset = u64::from(day.weekday().num_days_from_monday());
        let start_date = day
            .checked_sub_days(Days::new(offset))
            .ok_or_else(|| out_of_range(day))?;
        let end_date = start_date
            .checked_add_days(Days::new(6))
            .ok_or_else(|| out_of_range(day))?;
        Ok(Self {
            start_date,
            end_date,
            key: week_key(start_date, end_date),
        })
    }

    /// Parse ISO `YYYY-MM-DD` boundaries.
    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        let start_date = parse_iso_date(start)?;
        let end_date = parse_iso_date(end)?;
        Self::new(start_date, end_date)
    }

    /// Parse a `start_end` key back into a week.
    pub fn from_key(key: &str) -> Result<Self, DomainError> {
        let (start, end) = key
            .split_once('_')
            .ok_or_else(|| DomainError::InvalidWeek(format!("malformed week key '{key}'")))?;
        Self::parse(start, end)
    }

    /// Check that `key` still matches the boundaries. Deserialized weeks come
    /// from the metadata table and may have been edited by hand.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.start_date > self.end_date {
            return Err(DomainError::InvalidWeek(format!(
                "start {} is after end {}",
                self.start_date, self.end_date
            )));
        }
        let expected = week_key(self.start_date, self.end_date);
        if self.key != expected {
            return Err(DomainError::InvalidWeek(format!(
                "key '{}' does not match boundaries (expected '{expected}')",
                self.key
            )));
        }
        Ok(())
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    /// True once `day` is strictly after the last day of the week.
    pub fn has_ended_by(&self, day: NaiveDate) -> bool {
        day > self.end_date
    }

    pub fn next(&self) -> Result<Self, DomainError> {
        let day = self.end_date.succ_opt().ok_or_else(|| out_of_range(self.end_date))?;
        Self::containing(day)
    }

    pub fn previous(&self) -> Result<Self, DomainError> {
        let day = self.start_date.pred_opt().ok_or_else(|| out_of_range(self.start_date))?;
        Self::containing(day)
    }
}

fn out_of_range(day: NaiveDate) -> DomainError {
    DomainError::InvalidWeek(format!("no full week around {day} in the supported calendar"))
}

fn parse_iso_date(raw: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| DomainError::InvalidWeek(format!("invalid date '{raw}': {e}")))
}
