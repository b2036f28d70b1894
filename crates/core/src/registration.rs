//! Registration blackout windows.
//!
//! Administrators can close exam registration for a period, e.g. around
//! semester breaks. The windows are plain configuration loaded by the
//! engine before admission checks; there is no process-global state.

use serde::{Deserialize, Serialize};
use crate::Day;

/// Blackout configuration for exam registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationWindows {
    /// Blackout for part exam registration
    pub part: Option<Window>,

    /// Blackout for official exam registration
    pub official: Option<Window>,
}

impl RegistrationWindows {
    /// Whether part registration is closed on `day`.
    pub fn part_closed(&self, day: Day) -> bool {
        self.part.as_ref().is_some_and(|w| w.covers(day))
    }

    /// Whether official registration is closed on `day`.
    pub fn official_closed(&self, day: Day) -> bool {
        self.official.as_ref().is_some_and(|w| w.covers(day))
    }
}

/// A closed-from/closed-until interval; an open end means "until further notice".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// First closed day
    pub from: Day,

    /// Last closed day, inclusive; None leaves the window open-ended
    pub until: Option<Day>,
}

impl Window {
    /// Whether the window covers the given day.
    pub fn covers(&self, day: Day) -> bool {
        day >= self.from && self.until.map_or(true, |u| day <= u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn bounded_window() {
        let w = Window { from: d(2026, 1, 10), until: Some(d(2026, 1, 20)) };
        assert!(!w.covers(d(2026, 1, 9)));
        assert!(w.covers(d(2026, 1, 10)));
        assert!(w.covers(d(2026, 1, 20)));
        assert!(!w.covers(d(2026, 1, 21)));
    }

    #[test]
    fn open_ended_window() {
        let w = Window { from: d(2026, 1, 10), until: None };
        assert!(w.covers(d(2030, 12, 31)));
        assert!(!w.covers(d(2026, 1, 9)));
    }

    #[test]
    fn default_windows_are_open() {
        let cfg = RegistrationWindows::default();
        assert!(!cfg.part_closed(d(2026, 6, 1)));
        assert!(!cfg.official_closed(d(2026, 6, 1)));
    }
}
