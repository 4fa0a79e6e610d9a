use chrono::{Datelike, NaiveDate, NaiveTime, Utc, Weekday};

use shared_models::error::AppError;

/// Canonical wire/storage format for wall-clock times.
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses `YYYY-MM-DD`, rejecting impossible dates such as `2025-02-30`.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| AppError::ValidationError(format!("{} must be a valid date (YYYY-MM-DD)", field)))
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(field: &str, raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::ValidationError(format!("{} must be a time in HH:MM or HH:MM:SS format", field)))
}

pub fn ensure_time_order(start: NaiveTime, end: NaiveTime) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::ValidationError("start_time must be before end_time".to_string()));
    }
    Ok(())
}

pub fn ensure_not_past(date: NaiveDate) -> Result<(), AppError> {
    if date < today() {
        return Err(AppError::ValidationError("Cannot use a date in the past".to_string()));
    }
    Ok(())
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Day-of-week index with Sunday = 0 through Saturday = 6.
pub fn day_of_week_index(date: NaiveDate) -> i16 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Whole minutes between two times on the same day.
pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> i32 {
    (end - start).num_minutes() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn accepts_both_time_spellings() {
        assert_eq!(parse_clock_time("start_time", "9:05").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert_eq!(parse_clock_time("start_time", "14:30:15").unwrap(), NaiveTime::from_hms_opt(14, 30, 15).unwrap());
        assert_matches!(parse_clock_time("start_time", "25:00"), Err(AppError::ValidationError(_)));
        assert_matches!(parse_clock_time("start_time", "noon"), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert_ok!(parse_date("date", "2024-02-29"));
        assert_matches!(parse_date("date", "2025-02-30"), Err(AppError::ValidationError(_)));
        assert_matches!(parse_date("date", "30/01/2025"), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn sunday_is_day_zero() {
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(day_of_week_index(sunday), 0);
        assert_eq!(day_of_week_index(sunday.succ_opt().unwrap()), 1);
    }

    #[test]
    fn time_order_is_strict() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_err!(ensure_time_order(nine, nine));
        assert_eq!(minutes_between(nine, NaiveTime::from_hms_opt(9, 30, 0).unwrap()), 30);
    }
}
