use chrono::{Months, NaiveDate, Utc};

/// A window that ends today and reaches back a whole number of calendar
/// months. Month-end dates clamp (Mar 31 minus one month is Feb 28/29).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindow {
    months: u32,
}

impl TrailingWindow {
    pub const LAST_MONTH: TrailingWindow = TrailingWindow { months: 1 };

    pub fn months(months: u32) -> Self {
        Self { months }
    }

    /// First date (inclusive) that falls inside the window.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_months(Months::new(self.months))
            .unwrap_or(NaiveDate::MIN)
    }
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn last_month_steps_back_one_calendar_month() {
        assert_eq!(TrailingWindow::LAST_MONTH.cutoff(d(2026, 10, 19)), d(2026, 9, 19));
        assert_eq!(TrailingWindow::LAST_MONTH.cutoff(d(2026, 1, 5)), d(2025, 12, 5));
    }

    #[test]
    fn clamps_to_month_end() {
        assert_eq!(TrailingWindow::LAST_MONTH.cutoff(d(2026, 3, 31)), d(2026, 2, 28));
        assert_eq!(TrailingWindow::LAST_MONTH.cutoff(d(2028, 3, 30)), d(2028, 2, 29));
    }

    #[test]
    fn zero_month_window_starts_today() {
        assert_eq!(TrailingWindow::months(0).cutoff(d(2026, 6, 1)), d(2026, 6, 1));
    }
}
