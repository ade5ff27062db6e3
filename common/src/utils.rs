use chrono::{DateTime, Utc};

/// Check-ins are counted per UTC calendar day.
pub fn checked_in_today(last_check_in: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_check_in.map_or(false, |last| last.date_naive() == now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_calendar_day_counts_as_checked_in() {
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 1).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        assert!(checked_in_today(Some(morning), night));
    }

    #[test]
    fn previous_day_or_never_allows_check_in() {
        let yesterday = Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap();
        let today = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(!checked_in_today(Some(yesterday), today));
        assert!(!checked_in_today(None, today));
    }
}
