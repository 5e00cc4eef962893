use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::economy::gems::GemBreakdown;

pub const DEFAULT_POINTS_PER_ACK: i32 = 5;
/// Points added to the collective cup on every acknowledgment.
pub const ACK_COLLECTIVE_CUP_AWARD: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "couple_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CoupleStatus {
    Pending,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Couple {
    pub id: Uuid,
    pub status: CoupleStatus,
    pub invite_code: String,
    pub points_per_acknowledgment: i32,
    /// 0-99, wraps past 100 on acknowledgment awards.
    pub collective_cup_level: i32,
    pub anniversary_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// One player row per (couple, user). Gem counts are lifetime totals
/// including coal; the liquid columns track only acknowledged gems.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub couple_id: Uuid,
    pub user_id: Uuid,
    /// 0-99, wraps past 100.
    pub cup_level: i32,
    /// Sum of point values of all gems ever earned.
    pub gem_count: i64,
    pub gems_emerald: i64,
    pub gems_sapphire: i64,
    pub gems_ruby: i64,
    pub gems_diamond: i64,
    pub liquid_emerald: i64,
    pub liquid_sapphire: i64,
    pub liquid_ruby: i64,
    pub liquid_diamond: i64,
    pub achieved_milestones: Vec<i32>,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn gem_breakdown(&self) -> GemBreakdown {
        GemBreakdown {
            emerald: self.gems_emerald,
            sapphire: self.gems_sapphire,
            ruby: self.gems_ruby,
            diamond: self.gems_diamond,
        }
    }

    pub fn liquid_breakdown(&self) -> GemBreakdown {
        GemBreakdown {
            emerald: self.liquid_emerald,
            sapphire: self.liquid_sapphire,
            ruby: self.liquid_ruby,
            diamond: self.liquid_diamond,
        }
    }
}

/// API shape for a player, with the breakdowns folded into objects.
#[derive(Debug, Serialize)]
pub struct PlayerView {
    pub user_id: Uuid,
    pub cup_level: i32,
    pub gem_count: i64,
    pub gem_breakdown: GemBreakdown,
    pub liquid_breakdown: GemBreakdown,
    /// Point value of the liquid gems only; drives the proportional
    /// cup fill layers in the client.
    pub liquid_gem_value: i64,
    pub achieved_milestones: Vec<i32>,
    pub joined_at: DateTime<Utc>,
}

impl From<Player> for PlayerView {
    fn from(p: Player) -> Self {
        let gem_breakdown = p.gem_breakdown();
        let liquid_breakdown = p.liquid_breakdown();
        Self {
            user_id: p.user_id,
            cup_level: p.cup_level,
            gem_count: p.gem_count,
            gem_breakdown,
            liquid_breakdown,
            liquid_gem_value: liquid_breakdown.total_value(),
            achieved_milestones: p.achieved_milestones,
            joined_at: p.joined_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCoupleRequest {
    pub initial: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCoupleResponse {
    pub couple_id: Uuid,
    pub invite_code: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinCoupleRequest {
    pub invite_code: String,
    pub initial: String,
}

#[derive(Debug, Serialize)]
pub struct JoinCoupleResponse {
    pub couple_id: Uuid,
    pub partner_id: Uuid,
    pub partner_name: String,
}

/// Omitted or null fields keep their stored value; the anniversary
/// can be changed but not cleared.
#[derive(Debug, Deserialize)]
pub struct UpdateCoupleRequest {
    pub anniversary_date: Option<NaiveDate>,
    pub points_per_acknowledgment: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CoupleView {
    #[serde(flatten)]
    pub couple: Couple,
    pub players: Vec<PlayerView>,
}
