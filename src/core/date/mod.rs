//! Day identifier → canonical release timestamp.
//!
//! A day is either a zero-based index counted from the calendar epoch or a
//! literal timestamp at or after the epoch. Without a `latest_known` boundary
//! resolution is pure arithmetic. With one, resolution enters rotation mode:
//!
//! 1. a day already pinned in the ledger resolves to its pinned date;
//! 2. otherwise an unseen (or already-shown-at-this-candidate) ledger day is
//!    claimed, so fresh content is shown before anything repeats;
//! 3. otherwise the candidate wraps into `[epoch, latest_known + period)`.
//!
//! Outcomes of steps 2 and 3 are pinned so the same day never re-rotates.

mod ledger;
mod sqlite;

pub use ledger::{DayLedger, DayRecord, MemoryDayLedger, RotationOutcome, RotationSource};
pub use sqlite::SqliteDayLedger;

use tracing::debug;

use crate::core::config::CalendarConfig;
use crate::core::error::SchedulerError;

/// Caller-supplied day identifier, as received from a route or form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayInput {
    Number(i64),
    Text(String),
}

impl From<i64> for DayInput {
    fn from(value: i64) -> Self {
        DayInput::Number(value)
    }
}

impl From<&str> for DayInput {
    fn from(value: &str) -> Self {
        DayInput::Text(value.to_string())
    }
}

impl From<String> for DayInput {
    fn from(value: String) -> Self {
        DayInput::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub epoch: i64,
    pub seconds_per_day: i64,
}

impl Default for Calendar {
    fn default() -> Self {
        CalendarConfig::default().into()
    }
}

impl From<CalendarConfig> for Calendar {
    fn from(config: CalendarConfig) -> Self {
        Self {
            epoch: config.epoch,
            seconds_per_day: config.seconds_per_day,
        }
    }
}

/// A parsed day: its zero-based index and the timestamp it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub day_index: i64,
    pub timestamp: i64,
}

impl Calendar {
    pub fn parse(&self, day: &DayInput) -> Result<Candidate, SchedulerError> {
        let value = match day {
            DayInput::Number(n) => *n,
            DayInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| SchedulerError::InvalidDate(s.clone()))?,
        };

        if value >= self.epoch {
            return Ok(Candidate {
                day_index: (value - self.epoch).div_euclid(self.seconds_per_day),
                timestamp: value,
            });
        }
        if value < 0 {
            return Err(SchedulerError::InvalidDate(value.to_string()));
        }

        let timestamp = value
            .checked_mul(self.seconds_per_day)
            .and_then(|offset| offset.checked_add(self.epoch))
            .ok_or_else(|| SchedulerError::InvalidDate(value.to_string()))?;
        Ok(Candidate {
            day_index: value,
            timestamp,
        })
    }

    /// Wrap `timestamp` into the cycle `[epoch, latest_known + period)`.
    pub fn wrap(&self, timestamp: i64, latest_known: i64) -> Result<i64, SchedulerError> {
        if latest_known < self.epoch {
            return Err(SchedulerError::InvalidBaseline {
                latest_known,
                epoch: self.epoch,
            });
        }
        let min = self.epoch;
        let max = latest_known.checked_add(self.seconds_per_day).ok_or(
            SchedulerError::InvalidBaseline {
                latest_known,
                epoch: self.epoch,
            },
        )?;
        Ok((timestamp - min).rem_euclid(max - min) + min)
    }

    /// Number of days in the rotation cycle bounded by `latest_known`.
    pub fn cycle_len(&self, latest_known: i64) -> i64 {
        (latest_known - self.epoch) / self.seconds_per_day + 1
    }
}

pub struct DateResolver {
    calendar: Calendar,
}

impl DateResolver {
    pub fn new(calendar: Calendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Resolution without rotation: literal timestamps pass through, day
    /// indices become `epoch + index * seconds_per_day`.
    pub fn resolve_fixed(&self, day: Option<&DayInput>) -> Result<Option<i64>, SchedulerError> {
        match day {
            None => Ok(None),
            Some(day) => Ok(Some(self.calendar.parse(day)?.timestamp)),
        }
    }

    pub async fn resolve(
        &self,
        day: Option<DayInput>,
        latest_known: Option<i64>,
        ledger: Option<&dyn DayLedger>,
    ) -> Result<Option<i64>, SchedulerError> {
        let Some(day) = day else {
            return Ok(None);
        };
        let candidate = self.calendar.parse(&day)?;

        let Some(latest_known) = latest_known else {
            return Ok(Some(candidate.timestamp));
        };
        // Validate the baseline before touching the ledger.
        let wrapped = self.calendar.wrap(candidate.timestamp, latest_known)?;

        let Some(ledger) = ledger else {
            return Ok(Some(wrapped));
        };

        let outcome = ledger
            .assign_rotation(candidate.day_index, candidate.timestamp, wrapped)
            .await?;
        match outcome.source {
            RotationSource::Pinned => debug!(
                "Day {} already pinned to {}",
                candidate.day_index, outcome.record.date
            ),
            RotationSource::Claimed { day_index } => debug!(
                "Day {} claimed unseen day {} ({})",
                candidate.day_index, day_index, outcome.record.date
            ),
            RotationSource::Wrapped => debug!(
                "Day {} wrapped to {} (cycle of {} days)",
                candidate.day_index,
                wrapped,
                self.calendar.cycle_len(latest_known)
            ),
        }
        Ok(Some(outcome.record.date))
    }

    /// Newest date known to the ledger; the rotation boundary for callers
    /// that have no `latest_known` of their own.
    pub async fn latest_baseline(&self, ledger: &dyn DayLedger) -> Result<i64, SchedulerError> {
        ledger
            .latest_date()
            .await?
            .ok_or(SchedulerError::EmptyBaseline)
    }
}
