use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Days of the week on which something happens (ordering, delivery).
///
/// An empty schedule means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: BTreeSet<u32>,
}

impl WeeklySchedule {
    pub fn any_day() -> Self {
        Self::default()
    }

    pub fn on(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self {
            days: days
                .into_iter()
                .map(|d| d.num_days_from_monday())
                .collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.days.is_empty()
    }

    pub fn includes(&self, day: Weekday) -> bool {
        self.is_unrestricted() || self.days.contains(&day.num_days_from_monday())
    }

    /// First date on or after `from` that falls on a scheduled day.
    pub fn next_on_or_after(&self, from: NaiveDate) -> NaiveDate {
        (0..7u64)
            .filter_map(|offset| from.checked_add_days(Days::new(offset)))
            .find(|d| self.includes(d.weekday()))
            .unwrap_or(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_schedule_allows_every_day() {
        let s = WeeklySchedule::any_day();
        assert!(s.includes(Weekday::Sun));
        assert_eq!(s.next_on_or_after(date(2026, 10, 18)), date(2026, 10, 18));
    }

    #[test]
    fn next_date_skips_to_scheduled_day() {
        // 2026-10-19 is a Monday.
        let s = WeeklySchedule::on([Weekday::Wed, Weekday::Fri]);
        assert!(!s.includes(Weekday::Mon));
        assert_eq!(s.next_on_or_after(date(2026, 10, 19)), date(2026, 10, 21));
        assert_eq!(s.next_on_or_after(date(2026, 10, 22)), date(2026, 10, 23));
        assert_eq!(s.next_on_or_after(date(2026, 10, 24)), date(2026, 10, 28));
    }
}
