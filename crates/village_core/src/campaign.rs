//! Campaign progress: completed levels and the daily attempt counter.

use serde::{Deserialize, Serialize};

use crate::clock::{remaining_secs, Timestamp, MS_PER_DAY};
use crate::error::{CommandError, CommandResult};

/// Player progress through the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignProgress {
    /// Completed level ids, in completion order.
    #[serde(alias = "completedLevels")]
    pub completed: Vec<u32>,
    /// Attempts made on `attempt_day`.
    #[serde(alias = "dailyAttempts")]
    pub attempts_today: u32,
    /// Day index (`epoch ms / day`) the counter belongs to.
    pub attempt_day: u64,
    /// End of the post-attempt cooldown.
    #[serde(alias = "cooldownEndTime")]
    pub cooldown_end_at: Option<Timestamp>,
}

impl CampaignProgress {
    /// Record a completed level. Returns `false` if it was already recorded.
    pub fn complete(&mut self, level_id: u32) -> bool {
        if self.completed.contains(&level_id) {
            return false;
        }
        self.completed.push(level_id);
        true
    }

    /// Whether a level has been completed.
    #[must_use]
    pub fn is_completed(&self, level_id: u32) -> bool {
        self.completed.contains(&level_id)
    }

    /// Spend an attempt. Resets the counter on a new day and starts the
    /// cooldown. Returns attempts made today.
    ///
    /// # Errors
    ///
    /// [`CommandError::Cooldown`] while the previous cooldown runs.
    pub fn use_attempt(&mut self, now: Timestamp, cooldown_ms: u64) -> CommandResult<u32> {
        if let Some(end) = self.cooldown_end_at.filter(|end| now < *end) {
            return Err(CommandError::Cooldown {
                remaining_secs: remaining_secs(end, now),
            });
        }
        let today = now / MS_PER_DAY;
        if today != self.attempt_day {
            self.attempt_day = today;
            self.attempts_today = 0;
        }
        self.attempts_today += 1;
        self.cooldown_end_at = Some(now + cooldown_ms);
        Ok(self.attempts_today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_is_idempotent() {
        let mut progress = CampaignProgress::default();
        assert!(progress.complete(3));
        assert!(!progress.complete(3));
        assert!(progress.is_completed(3));
        assert_eq!(progress.completed, vec![3]);
    }

    #[test]
    fn test_attempts_reset_daily() {
        let mut progress = CampaignProgress::default();
        assert_eq!(progress.use_attempt(1_000, 600_000), Ok(1));
        assert_eq!(
            progress.use_attempt(541_000, 600_000),
            Err(CommandError::Cooldown { remaining_secs: 60 })
        );
        assert_eq!(progress.use_attempt(601_000, 600_000), Ok(2));
        assert_eq!(progress.use_attempt(MS_PER_DAY + 5, 600_000), Ok(1));
    }
}
