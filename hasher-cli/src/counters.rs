//! Daily-reset usage meter for external embedding providers.

use chrono::NaiveDate;

/// Request counter that resets once per calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyCounter {
    used: u32,
    max: u32,
    last_reset_date: NaiveDate,
}

impl DailyCounter {
    pub fn new(max: u32) -> Self {
        Self {
            used: 0,
            max,
            last_reset_date: chrono::Utc::now().date_naive(),
        }
    }

    /// Whether another request fits under the daily cap, resetting the
    /// meter first when the date has rolled over.
    pub fn can_make_request(&mut self) -> bool {
        self.roll_over(chrono::Utc::now().date_naive());
        self.used < self.max
    }

    /// Count one request. Monotonic within a day.
    pub fn increment(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if today > self.last_reset_date {
            self.used = 0;
            self.last_reset_date = today;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_within_day() {
        let mut counter = DailyCounter::new(2);
        assert!(counter.can_make_request());
        counter.increment();
        assert!(counter.can_make_request());
        counter.increment();
        assert!(!counter.can_make_request());
        assert_eq!(counter.used(), 2);
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn test_date_rollover_resets_usage() {
        let mut counter = DailyCounter::new(1);
        counter.increment();
        // simulate a counter last reset yesterday
        counter.last_reset_date = counter
            .last_reset_date
            .pred_opt()
            .expect("valid previous day");
        assert!(counter.can_make_request());
        assert_eq!(counter.used(), 0);
    }

    #[test]
    fn test_same_day_does_not_reset() {
        let mut counter = DailyCounter::new(5);
        counter.increment();
        counter.increment();
        assert!(counter.can_make_request());
        assert_eq!(counter.used(), 2);
    }
}
