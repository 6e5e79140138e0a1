//! Per-member streak tracking.
//!
//! A streak counts consecutive closed weeks in which the member's squad met
//! its goal. It is scoped to the squad, not to the member globally.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Streak state for one member of one squad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStreak {
    pub squad_id: Uuid,
    pub member_id: Uuid,
    /// Consecutive achieving weeks, 0 after a miss.
    pub current_streak: u32,
    /// High-water mark of `current_streak`. Never decreases.
    pub longest_streak: u32,
    pub last_week_achieved: bool,
}

impl MemberStreak {
    /// Fresh streak state.
    pub fn new(squad_id: Uuid, member_id: Uuid) -> Self {
        Self {
            squad_id,
            member_id,
            current_streak: 0,
            longest_streak: 0,
            last_week_achieved: false,
        }
    }

    /// Apply one closeout outcome.
    pub fn record(&mut self, achieved: bool) {
        if achieved {
            self.current_streak = if self.last_week_achieved {
                self.current_streak.saturating_add(1)
            } else {
                1
            };
            self.longest_streak = self.longest_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
        self.last_week_achieved = achieved;
    }
}
