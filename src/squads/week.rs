//! ISO week windows.
//!
//! Every squad week runs from Monday 00:00 UTC to the following Monday
//! 00:00 UTC. There is no per-user timezone adjustment.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of one scoring week in days.
pub const WEEK_DAYS: u64 = 7;

/// Monday of the week containing `now`.
pub fn current_week_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    let offset = u64::from(today.weekday().num_days_from_monday());
    today - Days::new(offset)
}

/// Monday of the week before the one containing `now`.
pub fn previous_week_start(now: DateTime<Utc>) -> NaiveDate {
    current_week_start(now) - Days::new(WEEK_DAYS)
}

/// Start of the week preceding `week_start`.
pub fn week_before(week_start: NaiveDate) -> NaiveDate {
    week_start - Days::new(WEEK_DAYS)
}

/// First Monday 00:00 UTC strictly after `now`.
pub fn next_week_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    WeekWindow::for_week(current_week_start(now)).end
}

/// Half-open `[start, end)` interval covering one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    /// Monday 00:00 UTC
    pub start: DateTime<Utc>,
    /// Following Monday 00:00 UTC, exclusive
    pub end: DateTime<Utc>,
}

impl WeekWindow {
    /// Window for the week beginning on `week_start`.
    pub fn for_week(week_start: NaiveDate) -> Self {
        let start = week_start.and_time(NaiveTime::MIN).and_utc();
        let end = (week_start + Days::new(WEEK_DAYS))
            .and_time(NaiveTime::MIN)
            .and_utc();
        Self { start, end }
    }

    /// Window of the week containing `now`.
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self::for_week(current_week_start(now))
    }

    /// The week start date this window was built from.
    pub fn week_start(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Whether `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}
