use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::economy::cups::advance_cup;
use crate::economy::gems::{GemState, GemType};
use crate::economy::matcher::{find_match, normalize, OpenRequest};
use crate::error::{AppError, AppResult};
use crate::handlers::couples::{active_couple_for, partner_of};
use crate::models::attempt::{
    daily_limit_reached, AcknowledgeAttemptResponse, Attempt, AttemptQuery, DailyAttemptsInfo,
    DailyGemEarnings, LogAttemptRequest, LogAttemptResponse, DAILY_ATTEMPT_LIMIT,
};
use crate::models::couple::ACK_COLLECTIVE_CUP_AWARD;
use crate::AppState;

fn start_of_today_utc() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Log an act of care for the partner. Validation, the daily-limit
/// count, the request-match scan and all writes run inside one
/// transaction; the actor's player row is locked first so two
/// concurrent logs by the same actor cannot both pass the limit check.
pub async fn log_attempt(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<LogAttemptRequest>,
) -> AppResult<Json<LogAttemptResponse>> {
    let action = body.action.trim().to_string();
    if action.is_empty() {
        return Err(AppError::Validation("Action is required".into()));
    }
    if body.for_player_id == auth_user.id {
        return Err(AppError::Validation(
            "Cannot log attempt for yourself".into(),
        ));
    }

    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let partner = partner_of(&state.db, couple.id, auth_user.id).await?;
    if partner != Some(body.for_player_id) {
        return Err(AppError::Validation("Invalid partner ID".into()));
    }

    let mut tx = state.db.begin().await?;

    // Lock order is couple row first, then player rows, everywhere
    // that takes both; otherwise a log racing an acknowledgment can
    // deadlock on the crossed locks.
    sqlx::query("SELECT 1 FROM couples WHERE id = $1 FOR UPDATE")
        .bind(couple.id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("SELECT 1 FROM players WHERE couple_id = $1 AND user_id = $2 FOR UPDATE")
        .bind(couple.id)
        .bind(auth_user.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::Forbidden("You are not part of this couple".into()))?;

    let today_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM attempts
        WHERE couple_id = $1 AND by_player_id = $2 AND created_at >= $3
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(start_of_today_utc())
    .fetch_one(&mut *tx)
    .await?;

    if daily_limit_reached(today_count) {
        return Err(AppError::DailyLimit(DAILY_ATTEMPT_LIMIT));
    }

    // Open requests addressed to the actor, oldest first, so matching
    // is deterministic.
    let open: Vec<OpenRequest> = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT id, action FROM requests
        WHERE couple_id = $1 AND for_player_id = $2 AND status = 'active'
        ORDER BY created_at ASC
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(id, action)| OpenRequest { id, action })
    .collect();

    let fulfilled_request_id = find_match(&normalize(&action), &open).map(|r| r.id);

    let gem_type = GemType::for_attempt(fulfilled_request_id.is_some());
    let gems_awarded = gem_type.value();

    let attempt_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO attempts
            (id, couple_id, by_player_id, for_player_id, action, description, category,
             created_at, acknowledged, fulfilled_request_id, gem_type, gem_state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, $9, $10, 'solid')
        "#,
    )
    .bind(attempt_id)
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(body.for_player_id)
    .bind(&action)
    .bind(body.description.as_deref().map(str::trim))
    .bind(&body.category)
    .bind(now)
    .bind(fulfilled_request_id)
    .bind(gem_type)
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        r#"
        UPDATE players SET
            gem_count = gem_count + $3,
            {col} = {col} + 1
        WHERE couple_id = $1 AND user_id = $2
        "#,
        col = lifetime_column(gem_type)
    ))
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(gems_awarded)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE couples SET last_activity_at = $2 WHERE id = $1")
        .bind(couple.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    if let Some(request_id) = fulfilled_request_id {
        sqlx::query(
            r#"
            UPDATE requests SET
                status = 'fulfilled',
                fulfilled_at = $2,
                fulfilled_by_attempt_id = $3
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(request_id)
        .bind(now)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        couple_id = %couple.id,
        attempt_id = %attempt_id,
        gem_type = ?gem_type,
        fulfilled_request = fulfilled_request_id.is_some(),
        "Attempt logged"
    );

    Ok(Json(LogAttemptResponse {
        attempt_id,
        gems_awarded,
        gem_type,
        fulfilled_request_id,
    }))
}

/// Guard checks for acknowledging an attempt: recipient only, not
/// already acknowledged, and gem states move forward only, so a
/// coaled attempt stays coal.
fn ensure_acknowledgeable(attempt: &Attempt, caller_id: Uuid) -> AppResult<()> {
    if attempt.for_player_id != caller_id {
        return Err(AppError::Forbidden(
            "Only the recipient can acknowledge".into(),
        ));
    }
    if attempt.acknowledged {
        return Err(AppError::Conflict("Attempt already acknowledged".into()));
    }
    if attempt.gem_state == GemState::Coal {
        return Err(AppError::FailedPrecondition(
            "Attempt has turned to coal and can no longer be acknowledged".into(),
        ));
    }
    Ok(())
}

/// Acknowledge a partner's attempt: solid -> liquid, a ruby to each
/// player, and both cup gauges advance with wraparound. All writes
/// commit in one transaction with the touched rows locked FOR UPDATE.
pub async fn acknowledge_attempt(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(attempt_id): Path<Uuid>,
) -> AppResult<Json<AcknowledgeAttemptResponse>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let mut tx = state.db.begin().await?;

    let attempt = sqlx::query_as::<_, Attempt>(
        "SELECT * FROM attempts WHERE id = $1 AND couple_id = $2 FOR UPDATE",
    )
    .bind(attempt_id)
    .bind(couple.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".into()))?;

    ensure_acknowledgeable(&attempt, auth_user.id)?;

    // Cup levels need computed new values, so take row locks rather
    // than bare increments. Lock order matches log_attempt: couple
    // first, then players by id.
    let (ack_points, collective_level) = sqlx::query_as::<_, (i32, i32)>(
        "SELECT points_per_acknowledgment, collective_cup_level FROM couples WHERE id = $1 FOR UPDATE",
    )
    .bind(couple.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("SELECT user_id FROM players WHERE couple_id = $1 ORDER BY user_id FOR UPDATE")
        .bind(couple.id)
        .fetch_all(&mut *tx)
        .await?;

    let recipient_cup: i32 = sqlx::query_scalar(
        "SELECT cup_level FROM players WHERE couple_id = $1 AND user_id = $2",
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .fetch_one(&mut *tx)
    .await?;

    let cup = advance_cup(recipient_cup, ack_points);
    let collective = advance_cup(collective_level, ACK_COLLECTIVE_CUP_AWARD);

    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE attempts SET
            acknowledged = true,
            acknowledged_at = $2,
            gem_state = 'liquid'
        WHERE id = $1
        "#,
    )
    .bind(attempt.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Actor earns a ruby; their original solid gem also becomes liquid.
    sqlx::query(&format!(
        r#"
        UPDATE players SET
            gem_count = gem_count + $3,
            gems_ruby = gems_ruby + 1,
            liquid_ruby = liquid_ruby + 1,
            {col} = {col} + 1
        WHERE couple_id = $1 AND user_id = $2
        "#,
        col = liquid_column(attempt.gem_type)
    ))
    .bind(couple.id)
    .bind(attempt.by_player_id)
    .bind(GemType::Ruby.value())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE players SET
            gem_count = gem_count + $3,
            gems_ruby = gems_ruby + 1,
            liquid_ruby = liquid_ruby + 1,
            cup_level = $4
        WHERE couple_id = $1 AND user_id = $2
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(GemType::Ruby.value())
    .bind(cup.level)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE couples SET collective_cup_level = $2, last_activity_at = $3 WHERE id = $1",
    )
    .bind(couple.id)
    .bind(collective.level)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        couple_id = %couple.id,
        attempt_id = %attempt.id,
        cup_overflow = cup.overflow,
        collective_cup_overflow = collective.overflow,
        "Attempt acknowledged"
    );

    Ok(Json(AcknowledgeAttemptResponse {
        success: true,
        gems_awarded: GemType::Ruby.value() * 2,
        cup_overflow: cup.overflow,
        collective_cup_overflow: collective.overflow,
    }))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<AttemptQuery>,
) -> AppResult<Json<Vec<Attempt>>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let mut qb =
        sqlx::QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM attempts WHERE couple_id = ");
    qb.push_bind(couple.id);
    match query.direction.as_deref() {
        Some("by") => {
            qb.push(" AND by_player_id = ");
            qb.push_bind(auth_user.id);
        }
        Some("for") => {
            qb.push(" AND for_player_id = ");
            qb.push_bind(auth_user.id);
        }
        Some(other) => {
            return Err(AppError::Validation(format!(
                "Unknown direction filter: {other}"
            )))
        }
        None => {}
    }
    if let Some(acked) = query.acknowledged {
        qb.push(" AND acknowledged = ");
        qb.push_bind(acked);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ");
    qb.push_bind(limit);

    let attempts = qb
        .build_query_as::<Attempt>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(attempts))
}

/// Today's attempt budget for the caller, UTC day.
pub async fn daily_attempts_info(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DailyAttemptsInfo>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM attempts
        WHERE couple_id = $1 AND by_player_id = $2 AND created_at >= $3
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(start_of_today_utc())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DailyAttemptsInfo {
        count,
        remaining: (DAILY_ATTEMPT_LIMIT - count).max(0),
        limit: DAILY_ATTEMPT_LIMIT,
    }))
}

/// Today's gem earnings for the caller, split into points from logging
/// and points from acknowledgments (given and received).
pub async fn daily_gem_earnings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DailyGemEarnings>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;
    let start = start_of_today_utc();

    let logged_types: Vec<GemType> = sqlx::query_scalar(
        r#"
        SELECT gem_type FROM attempts
        WHERE couple_id = $1 AND by_player_id = $2 AND created_at >= $3
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(start)
    .fetch_all(&state.db)
    .await?;

    let from_logging: i64 = logged_types.into_iter().map(GemType::value).sum();

    let acks_involving_caller: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM attempts
        WHERE couple_id = $1
          AND (by_player_id = $2 OR for_player_id = $2)
          AND acknowledged_at >= $3
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(start)
    .fetch_one(&state.db)
    .await?;

    let from_acknowledgments = acks_involving_caller * GemType::Ruby.value();

    Ok(Json(DailyGemEarnings {
        total: from_logging + from_acknowledgments,
        from_logging,
        from_acknowledgments,
    }))
}

fn lifetime_column(gem: GemType) -> &'static str {
    match gem {
        GemType::Emerald => "gems_emerald",
        GemType::Sapphire => "gems_sapphire",
        GemType::Ruby => "gems_ruby",
        GemType::Diamond => "gems_diamond",
    }
}

fn liquid_column(gem: GemType) -> &'static str {
    match gem {
        GemType::Emerald => "liquid_emerald",
        GemType::Sapphire => "liquid_sapphire",
        GemType::Ruby => "liquid_ruby",
        GemType::Diamond => "liquid_diamond",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_for(recipient: Uuid) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            couple_id: Uuid::new_v4(),
            by_player_id: Uuid::new_v4(),
            for_player_id: recipient,
            action: "make coffee".into(),
            description: None,
            category: None,
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
            fulfilled_request_id: None,
            gem_type: GemType::Emerald,
            gem_state: GemState::Solid,
            coal_at: None,
        }
    }

    #[test]
    fn recipient_can_acknowledge_solid_attempt() {
        let recipient = Uuid::new_v4();
        assert!(ensure_acknowledgeable(&attempt_for(recipient), recipient).is_ok());
    }

    #[test]
    fn only_the_recipient_can_acknowledge() {
        let attempt = attempt_for(Uuid::new_v4());
        let err = ensure_acknowledgeable(&attempt, attempt.by_player_id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn second_acknowledgment_is_rejected() {
        let recipient = Uuid::new_v4();
        let mut attempt = attempt_for(recipient);
        attempt.acknowledged = true;
        attempt.gem_state = GemState::Liquid;
        let err = ensure_acknowledgeable(&attempt, recipient).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn coal_attempt_cannot_be_acknowledged() {
        let recipient = Uuid::new_v4();
        let mut attempt = attempt_for(recipient);
        attempt.gem_state = GemState::Coal;
        let err = ensure_acknowledgeable(&attempt, recipient).unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(_)));
    }
}
