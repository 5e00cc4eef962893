use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A reusable idea authored by one partner describing what fills their
/// cup. No status; the author deletes it explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Suggestion {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub by_player_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSuggestionRequest {
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
}
