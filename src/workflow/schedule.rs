//! Publication window checks.
//!
//! Windows are compared at minute granularity: seconds and sub-seconds are
//! dropped before comparison, matching the minute-resolution picker the
//! dashboard uses.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input forms accepted besides RFC 3339
const PICKER_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("scheduled_start is required")]
    MissingStart,
    #[error("scheduled_end is required")]
    MissingEnd,
    #[error("scheduled_end ({end}) must be after scheduled_start ({start})")]
    EndNotAfterStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("'{input}' is not a valid date and time (expected YYYY-MM-DDTHH:MM or RFC 3339)")]
    Unparseable { input: String },
}

impl ScheduleError {
    /// Field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            ScheduleError::MissingStart => "scheduled_start",
            ScheduleError::MissingEnd | ScheduleError::EndNotAfterStart { .. } => "scheduled_end",
            ScheduleError::Unparseable { .. } => "schedule",
        }
    }
}

/// Validated publication window; `end > start` always holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ScheduleWindow {
    /// Validate a pair of optional bounds
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, ScheduleError> {
        let start = truncate_to_minute(start.ok_or(ScheduleError::MissingStart)?);
        let end = truncate_to_minute(end.ok_or(ScheduleError::MissingEnd)?);
        if end <= start {
            return Err(ScheduleError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse and validate user-entered bounds
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        Self::new(
            Some(parse_schedule_input(start)?),
            Some(parse_schedule_input(end)?),
        )
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Drop seconds and sub-seconds
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Parse an RFC 3339 timestamp or a picker value (`2025-06-01T09:00`, read as UTC)
pub fn parse_schedule_input(input: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let trimmed = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    PICKER_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ScheduleError::Unparseable {
            input: input.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_valid_window() {
        let window = ScheduleWindow::new(Some(at(9, 0, 0)), Some(at(18, 0, 0))).unwrap();
        assert_eq!(window.start(), at(9, 0, 0));
        assert!(window.contains(at(12, 0, 0)));
        assert!(!window.contains(at(18, 0, 0)));
    }

    #[test]
    fn test_missing_bounds_rejected() {
        assert_eq!(
            ScheduleWindow::new(None, Some(at(9, 0, 0))),
            Err(ScheduleError::MissingStart)
        );
        assert_eq!(
            ScheduleWindow::new(Some(at(9, 0, 0)), None),
            Err(ScheduleError::MissingEnd)
        );
    }

    #[test]
    fn test_equal_and_inverted_bounds_rejected() {
        let equal = ScheduleWindow::new(Some(at(9, 0, 0)), Some(at(9, 0, 0)));
        assert!(matches!(equal, Err(ScheduleError::EndNotAfterStart { .. })));

        let inverted = ScheduleWindow::new(Some(at(10, 0, 0)), Some(at(9, 0, 0)));
        assert_eq!(inverted.unwrap_err().field(), "scheduled_end");
    }

    #[test]
    fn test_same_minute_is_not_after() {
        // 09:00:10 vs 09:00:50 are the same minute once truncated
        let result = ScheduleWindow::new(Some(at(9, 0, 10)), Some(at(9, 0, 50)));
        assert!(matches!(result, Err(ScheduleError::EndNotAfterStart { .. })));

        let window = ScheduleWindow::new(Some(at(9, 0, 59)), Some(at(9, 1, 0))).unwrap();
        assert_eq!(window.start(), at(9, 0, 0));
    }

    #[test]
    fn test_parse_picker_and_rfc3339() {
        assert_eq!(parse_schedule_input("2025-06-01T09:00").unwrap(), at(9, 0, 0));
        assert_eq!(parse_schedule_input("2025-06-01 09:00").unwrap(), at(9, 0, 0));
        assert_eq!(
            parse_schedule_input("2025-06-01T11:00:00+02:00").unwrap(),
            at(9, 0, 0)
        );
        assert!(matches!(
            parse_schedule_input("next tuesday"),
            Err(ScheduleError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_parse_window() {
        let window = ScheduleWindow::parse("2025-06-01T09:00", "2025-06-15T18:00").unwrap();
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2025, 6, 15, 18, 0, 0).unwrap());
    }
}
