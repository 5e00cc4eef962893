use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A player may hold at most this many active requests at once.
pub const ACTIVE_REQUEST_LIMIT: i64 = 5;

/// True once the creator's active-request quota is full; the count is
/// taken under the creator's player-row lock so the check cannot race.
pub fn request_limit_reached(active_count: i64) -> bool {
    active_count >= ACTIVE_REQUEST_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Active,
    Fulfilled,
    Canceled,
}

/// A standing ask from one partner to the other. Status moves one way:
/// active -> fulfilled (by a matching attempt) or active -> canceled
/// (by the creator), and is terminal either way.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CareRequest {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub by_player_id: Uuid,
    pub for_player_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub fulfilled_by_attempt_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestRequest {
    pub for_player_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActiveRequestsInfo {
    pub count: i64,
    pub remaining: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifth_request_is_allowed() {
        assert!(!request_limit_reached(ACTIVE_REQUEST_LIMIT - 1));
    }

    #[test]
    fn sixth_request_is_rejected() {
        assert!(request_limit_reached(ACTIVE_REQUEST_LIMIT));
        assert!(request_limit_reached(ACTIVE_REQUEST_LIMIT + 1));
    }
}
