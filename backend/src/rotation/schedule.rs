//! Calendar of contribution rounds.
//!
//! Round `r` opens `r - 1` periods after the start date and its contributions
//! are due when the next period begins.

use crate::models::Frequency;
use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Open and due dates for one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundWindow {
    pub round: i32,
    pub opens_on: NaiveDate,
    pub due_on: NaiveDate,
}

fn add_periods(start: NaiveDate, frequency: Frequency, periods: u32) -> Option<NaiveDate> {
    match frequency {
        Frequency::Weekly => start.checked_add_days(chrono::Days::new(7 * u64::from(periods))),
        Frequency::Biweekly => start.checked_add_days(chrono::Days::new(14 * u64::from(periods))),
        Frequency::Monthly => start.checked_add_months(Months::new(periods)),
    }
}

/// First day of `round` (1-based)
pub fn round_opens_on(start: NaiveDate, frequency: Frequency, round: i32) -> Option<NaiveDate> {
    let periods = u32::try_from(round.checked_sub(1)?).ok()?;
    add_periods(start, frequency, periods)
}

/// Day by which contributions for `round` must be in
pub fn round_due_date(start: NaiveDate, frequency: Frequency, round: i32) -> Option<NaiveDate> {
    let periods = u32::try_from(round).ok()?;
    if periods == 0 {
        return None;
    }
    add_periods(start, frequency, periods)
}

pub fn round_window(start: NaiveDate, frequency: Frequency, round: i32) -> Option<RoundWindow> {
    Some(RoundWindow {
        round,
        opens_on: round_opens_on(start, frequency, round)?,
        due_on: round_due_date(start, frequency, round)?,
    })
}

/// The due day belongs to the next period, so a round is past due from that day on
pub fn is_past_due(day: NaiveDate, due_on: NaiveDate) -> bool {
    day >= due_on
}

/// A contribution is late when it lands on or after the due day
pub fn is_late(paid_at: NaiveDateTime, due_on: NaiveDate) -> bool {
    is_past_due(paid_at.date(), due_on)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_windows() {
        let start = date(2024, 1, 1);
        let window = round_window(start, Frequency::Weekly, 3).unwrap();
        assert_eq!(window.opens_on, date(2024, 1, 15));
        assert_eq!(window.due_on, date(2024, 1, 22));
    }

    #[test]
    fn test_biweekly_due_date() {
        let start = date(2024, 1, 1);
        assert_eq!(round_due_date(start, Frequency::Biweekly, 1), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let start = date(2024, 1, 31);
        assert_eq!(round_due_date(start, Frequency::Monthly, 1), Some(date(2024, 2, 29)));
        assert_eq!(round_opens_on(start, Frequency::Monthly, 1), Some(start));
    }

    #[test]
    fn test_round_zero_has_no_window() {
        let start = date(2024, 1, 1);
        assert_eq!(round_due_date(start, Frequency::Weekly, 0), None);
        assert_eq!(round_opens_on(start, Frequency::Weekly, 0), None);
        assert!(round_window(start, Frequency::Monthly, -2).is_none());
    }

    #[test]
    fn test_is_late() {
        let due = date(2024, 3, 1);
        let before = date(2024, 2, 29).and_hms_opt(23, 59, 59).unwrap();
        let on_due_day = date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap();
        assert!(!is_late(before, due));
        assert!(is_late(on_due_day, due));
    }

    #[test]
    fn test_unpaid_round_is_past_due_on_the_due_day() {
        let due = date(2024, 3, 1);
        assert!(!is_past_due(date(2024, 2, 29), due));
        assert!(is_past_due(due, due));
        assert!(is_past_due(date(2024, 3, 2), due));
    }
}
