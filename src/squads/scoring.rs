//! Weekly scoring policy.
//!
//! Meeting the goal earns a base award plus a bonus that is larger when the
//! squad raised its target over last week. Missing it costs a flat penalty
//! no matter how close the squad came.

use serde::{Deserialize, Serialize};

/// Outcome of scoring one squad week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub points_delta: i64,
    pub achieved: bool,
}

/// How closeout treats a week whose target was never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroTargetPolicy {
    /// Count the goal as missed and apply the miss penalty.
    #[default]
    Penalize,
    /// Apply the plain rule, under which any progress meets a zero target.
    Score,
    /// Close the week without awarding or deducting anything.
    Skip,
}

/// Point values used when closing out a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Awarded for meeting the goal
    pub base_points: i64,
    /// Extra when this week's target is above last week's
    pub raised_target_bonus: i64,
    /// Extra when the target stayed flat or was lowered
    pub steady_target_bonus: i64,
    /// Deducted for missing the goal (stored as a positive number)
    pub miss_penalty: i64,
    /// Treatment of weeks without a target
    pub zero_target: ZeroTargetPolicy,
    /// When false, closeout never pushes a squad balance below zero
    pub allow_negative_balance: bool,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_points: 50,
            raised_target_bonus: 20,
            steady_target_bonus: 5,
            miss_penalty: 20,
            zero_target: ZeroTargetPolicy::Penalize,
            allow_negative_balance: true,
        }
    }
}

impl ScoringPolicy {
    /// Score a week from its target, last week's target and the distance
    /// covered.
    pub fn score(&self, target_current: f64, target_previous: f64, progress_current: f64) -> Score {
        if progress_current >= target_current {
            let bonus = if target_current > target_previous {
                self.raised_target_bonus
            } else {
                self.steady_target_bonus
            };
            Score {
                points_delta: self.base_points + bonus,
                achieved: true,
            }
        } else {
            self.miss()
        }
    }

    /// Score a week at closeout, honoring the zero-target policy.
    ///
    /// Returns `None` when the week should be closed without scoring.
    pub fn score_week(
        &self,
        target_current: f64,
        target_previous: f64,
        progress_current: f64,
    ) -> Option<Score> {
        if target_current > 0.0 {
            return Some(self.score(target_current, target_previous, progress_current));
        }

        match self.zero_target {
            ZeroTargetPolicy::Penalize => Some(self.miss()),
            ZeroTargetPolicy::Score => {
                Some(self.score(target_current, target_previous, progress_current))
            }
            ZeroTargetPolicy::Skip => None,
        }
    }

    fn miss(&self) -> Score {
        Score {
            points_delta: -self.miss_penalty,
            achieved: false,
        }
    }
}
