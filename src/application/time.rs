use chrono::{Datelike, NaiveDate};

use crate::domain::models::DateRange;
use crate::error::ScheduleError;

/// Number of days in `month` (1-12) of `year`.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;

    // the day before the first of next month
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next_month.signed_duration_since(first_day).num_days() as u32)
}

/// Whole calendar month as an inclusive range. `month` is 1-12.
pub fn month_range(year: i32, month: u32) -> Result<DateRange, ScheduleError> {
    let invalid = || ScheduleError::Validation(format!("month must be 1-12, got {month}"));

    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let days = days_in_month(year, month).ok_or_else(invalid)?;
    let end = start
        .with_day(days)
        .ok_or_else(invalid)?;

    DateRange::new(start, end).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2025, 11), Some(30));
        assert_eq!(days_in_month(2025, 12), Some(31));
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2025, 2), Some(28));
        assert_eq!(days_in_month(2025, 13), None);
    }

    #[test]
    fn month_range_covers_whole_month() {
        let range = month_range(2025, 12).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(range.day_count(), 31);

        assert!(matches!(month_range(2025, 0), Err(ScheduleError::Validation(_))));
    }
}
