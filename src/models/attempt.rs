use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::economy::gems::{GemState, GemType};

pub const DAILY_ATTEMPT_LIMIT: i64 = 20;
pub const COAL_THRESHOLD_DAYS: i64 = 14;

/// True once today's attempt budget is exhausted; the count is taken
/// under the actor's player-row lock so the check cannot race.
pub fn daily_limit_reached(todays_count: i64) -> bool {
    todays_count >= DAILY_ATTEMPT_LIMIT
}

/// One partner's logged act of care for the other.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub by_player_id: Uuid,
    pub for_player_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub fulfilled_request_id: Option<Uuid>,
    pub gem_type: GemType,
    pub gem_state: GemState,
    pub coal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LogAttemptRequest {
    pub for_player_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogAttemptResponse {
    pub attempt_id: Uuid,
    pub gems_awarded: i64,
    pub gem_type: GemType,
    pub fulfilled_request_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AcknowledgeAttemptResponse {
    pub success: bool,
    /// Total points distributed: one ruby to each player.
    pub gems_awarded: i64,
    pub cup_overflow: bool,
    pub collective_cup_overflow: bool,
}

#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    /// "by" = logged by the caller, "for" = logged for the caller.
    pub direction: Option<String>,
    pub acknowledged: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DailyAttemptsInfo {
    pub count: i64,
    pub remaining: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyGemEarnings {
    pub total: i64,
    pub from_logging: i64,
    pub from_acknowledgments: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twentieth_attempt_is_allowed() {
        assert!(!daily_limit_reached(DAILY_ATTEMPT_LIMIT - 1));
    }

    #[test]
    fn twenty_first_attempt_is_rejected() {
        assert!(daily_limit_reached(DAILY_ATTEMPT_LIMIT));
        assert!(daily_limit_reached(DAILY_ATTEMPT_LIMIT + 1));
    }
}
