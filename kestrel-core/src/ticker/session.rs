//! Trading session descriptor
//!
//! Converts between wall-clock `HHMM` times and session-relative minute
//! counts. Sections must not cross midnight; the first section opens the
//! session and the last one closes it.

use serde::{Deserialize, Serialize};

/// One continuous trading span, `[from, to)` in wall-clock `HHMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSection {
    pub from: u32,
    pub to: u32,
}

#[inline]
fn to_minutes_of_day(hhmm: u32) -> u32 {
    (hhmm / 100) * 60 + hhmm % 100
}

#[inline]
fn to_hhmm(minutes_of_day: u32) -> u32 {
    (minutes_of_day / 60) * 100 + minutes_of_day % 60
}

impl SessionSection {
    pub fn minutes(&self) -> u32 {
        to_minutes_of_day(self.to).saturating_sub(to_minutes_of_day(self.from))
    }

    pub fn contains(&self, hhmm: u32) -> bool {
        hhmm >= self.from && hhmm < self.to
    }
}

/// A named trading session: its sections and derived minute arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub sections: Vec<SessionSection>,
}

impl SessionInfo {
    pub fn new(id: &str, sections: Vec<(u32, u32)>) -> Self {
        Self {
            id: id.to_string(),
            sections: sections
                .into_iter()
                .map(|(from, to)| SessionSection { from, to })
                .collect(),
        }
    }

    /// Default Chinese futures day session used when config omits one.
    pub fn day_session(id: &str) -> Self {
        Self::new(id, vec![(930, 1130), (1300, 1500)])
    }

    pub fn open_time(&self) -> u32 {
        self.sections.first().map(|s| s.from).unwrap_or(0)
    }

    pub fn close_time(&self) -> u32 {
        self.sections.last().map(|s| s.to).unwrap_or(0)
    }

    /// Total session length in minutes.
    pub fn trading_minutes(&self) -> u32 {
        self.sections.iter().map(SessionSection::minutes).sum()
    }

    pub fn is_in_trading_time(&self, hhmm: u32) -> bool {
        self.sections.iter().any(|s| s.contains(hhmm))
    }

    /// True exactly at a section boundary close (`11:30` for `0930-1130`).
    pub fn is_section_end(&self, hhmm: u32) -> bool {
        self.sections.iter().any(|s| s.to == hhmm)
    }

    /// Completed session minutes once the minute containing `hhmm` finishes.
    ///
    /// A time inside minute index `m` (0-based) yields `m + 1`; a time at a
    /// section close boundary yields the section's cumulative length; times
    /// in a break or past the close clamp to the preceding sections.
    pub fn elapsed_minutes(&self, hhmm: u32) -> u32 {
        let t = to_minutes_of_day(hhmm);
        let mut acc = 0u32;
        for section in &self.sections {
            let from = to_minutes_of_day(section.from);
            let to = to_minutes_of_day(section.to);
            if t < from {
                return acc;
            }
            if t < to {
                return acc + (t - from) + 1;
            }
            acc += to - from;
        }
        acc
    }

    /// Wall-clock `HHMM` at which session minute `index` (0-based) starts.
    /// Indexes past the end clamp to the close time.
    pub fn minute_start(&self, index: u32) -> u32 {
        let mut left = index;
        for section in &self.sections {
            let len = section.minutes();
            if left < len {
                return to_hhmm(to_minutes_of_day(section.from) + left);
            }
            left -= len;
        }
        self.close_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn futures() -> SessionInfo {
        SessionInfo::day_session("FD0900")
    }

    #[test]
    fn test_totals_and_bounds() {
        let s = futures();
        assert_eq!(s.trading_minutes(), 240);
        assert_eq!(s.open_time(), 930);
        assert_eq!(s.close_time(), 1500);
    }

    #[test]
    fn test_elapsed_minutes() {
        let s = futures();
        // Open minute is index 0, so its ticks count one completed minute.
        assert_eq!(s.elapsed_minutes(930), 1);
        assert_eq!(s.elapsed_minutes(931), 2);
        assert_eq!(s.elapsed_minutes(1014), 45);
        assert_eq!(s.elapsed_minutes(1129), 120);
        // Boundary time belongs to no minute: the section is complete.
        assert_eq!(s.elapsed_minutes(1130), 120);
        // Break clamps to the first section.
        assert_eq!(s.elapsed_minutes(1200), 120);
        assert_eq!(s.elapsed_minutes(1300), 121);
        assert_eq!(s.elapsed_minutes(1459), 240);
        assert_eq!(s.elapsed_minutes(1500), 240);
        assert_eq!(s.elapsed_minutes(2200), 240);
        // Before open.
        assert_eq!(s.elapsed_minutes(900), 0);
    }

    #[test]
    fn test_minute_start_inverts_elapsed() {
        let s = futures();
        assert_eq!(s.minute_start(0), 930);
        assert_eq!(s.minute_start(44), 1014);
        assert_eq!(s.minute_start(119), 1129);
        // Second section resumes after the break.
        assert_eq!(s.minute_start(120), 1300);
        assert_eq!(s.minute_start(239), 1459);
        assert_eq!(s.minute_start(240), 1500);
    }

    #[test]
    fn test_trading_time_checks() {
        let s = futures();
        assert!(s.is_in_trading_time(930));
        assert!(s.is_in_trading_time(1129));
        assert!(!s.is_in_trading_time(1130));
        assert!(!s.is_in_trading_time(1230));
        assert!(s.is_in_trading_time(1300));
        assert!(!s.is_in_trading_time(1500));
        assert!(s.is_section_end(1130));
        assert!(s.is_section_end(1500));
        assert!(!s.is_section_end(1031));
    }
}
