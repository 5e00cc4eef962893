use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::couple::{
    Couple, CoupleView, CreateCoupleRequest, CreateCoupleResponse, JoinCoupleRequest,
    JoinCoupleResponse, Player, PlayerView, UpdateCoupleRequest, DEFAULT_POINTS_PER_ACK,
};
use crate::models::invite::{
    generate_invite_code, sanitize_invite_code, InviteCode, InviteStatus,
    INVITE_CODE_EXPIRATION_HOURS,
};
use crate::AppState;

const INVITE_CODE_MAX_RETRIES: u32 = 5;

/// Load the caller's active couple, or fail if they are not paired.
pub(crate) async fn active_couple_for(db: &PgPool, user_id: Uuid) -> AppResult<Couple> {
    let couple_id = sqlx::query_scalar::<_, Option<Uuid>>(
        "SELECT active_couple_id FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("User not found".into()))?
    .ok_or(AppError::FailedPrecondition("You are not in a couple".into()))?;

    let couple = sqlx::query_as::<_, Couple>("SELECT * FROM couples WHERE id = $1")
        .bind(couple_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Couple not found".into()))?;

    Ok(couple)
}

/// The other player in the couple, if a second partner has joined.
pub(crate) async fn partner_of(
    db: &PgPool,
    couple_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let partner = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM players WHERE couple_id = $1 AND user_id <> $2",
    )
    .bind(couple_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(partner)
}

fn sanitize_initial(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() != 1 {
        return Err(AppError::Validation(
            "Initial must be a single character".into(),
        ));
    }
    Ok(trimmed.to_uppercase())
}

pub async fn create_couple(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateCoupleRequest>,
) -> AppResult<Json<CreateCoupleResponse>> {
    let initial = sanitize_initial(&body.initial)?;

    // Invite codes are the table's primary key; a collision surfaces
    // as a unique violation on insert and we retry with a fresh code.
    let mut last_err: Option<AppError> = None;
    for _ in 0..INVITE_CODE_MAX_RETRIES {
        let code = generate_invite_code();
        match try_create_couple(&state.db, auth_user.id, &initial, &code).await {
            Ok(resp) => return Ok(Json(resp)),
            Err(AppError::Database(e)) if is_unique_violation(&e) => {
                last_err = Some(AppError::Database(e));
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        AppError::Internal(anyhow::anyhow!("Failed to generate unique invite code"))
    }))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().map(|d| d.kind()),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}

async fn try_create_couple(
    db: &PgPool,
    creator_id: Uuid,
    initial: &str,
    code: &str,
) -> AppResult<CreateCoupleResponse> {
    let mut tx = db.begin().await?;

    // Lock the user row so two concurrent creates cannot both pass the
    // already-paired check.
    let active: Option<Uuid> = sqlx::query_scalar(
        "SELECT active_couple_id FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(creator_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("User not found".into()))?;

    if active.is_some() {
        return Err(AppError::Conflict("You are already in a couple".into()));
    }

    let couple_id = Uuid::new_v4();
    let now = Utc::now();
    let expires_at = now + Duration::hours(INVITE_CODE_EXPIRATION_HOURS);

    sqlx::query(
        r#"
        INSERT INTO couples (id, status, invite_code, points_per_acknowledgment, collective_cup_level, created_at, last_activity_at)
        VALUES ($1, 'pending', $2, $3, 0, $4, $4)
        "#,
    )
    .bind(couple_id)
    .bind(code)
    .bind(DEFAULT_POINTS_PER_ACK)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO players (couple_id, user_id, joined_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(couple_id)
    .bind(creator_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO invite_codes (code, couple_id, creator_id, status, created_at, expires_at)
        VALUES ($1, $2, $3, 'active', $4, $5)
        "#,
    )
    .bind(code)
    .bind(couple_id)
    .bind(creator_id)
    .bind(now)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET initial = $2, active_couple_id = $3, updated_at = NOW() WHERE id = $1")
        .bind(creator_id)
        .bind(initial)
        .bind(couple_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(couple_id = %couple_id, creator_id = %creator_id, "Couple created");

    Ok(CreateCoupleResponse {
        couple_id,
        invite_code: code.to_string(),
    })
}

pub async fn join_couple(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<JoinCoupleRequest>,
) -> AppResult<Json<JoinCoupleResponse>> {
    let code = sanitize_invite_code(&body.invite_code)
        .ok_or_else(|| AppError::Validation("Invalid invite code format".into()))?;
    let initial = sanitize_initial(&body.initial)?;

    let mut tx = state.db.begin().await?;

    let active: Option<Uuid> = sqlx::query_scalar(
        "SELECT active_couple_id FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("User not found".into()))?;

    if active.is_some() {
        return Err(AppError::Conflict("You are already in a couple".into()));
    }

    // Row lock serializes concurrent joins against the same code: the
    // second transaction blocks here and then sees status = used.
    let invite = sqlx::query_as::<_, InviteCode>(
        "SELECT * FROM invite_codes WHERE code = $1 FOR UPDATE",
    )
    .bind(&code)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Invalid invite code".into()))?;

    if invite.status != InviteStatus::Active {
        return Err(AppError::FailedPrecondition(
            "Invite code has already been used".into(),
        ));
    }
    if invite.expires_at < Utc::now() {
        return Err(AppError::FailedPrecondition("Invite code has expired".into()));
    }
    if invite.creator_id == auth_user.id {
        return Err(AppError::FailedPrecondition(
            "Cannot join your own couple".into(),
        ));
    }

    let couple = sqlx::query_as::<_, Couple>("SELECT * FROM couples WHERE id = $1 FOR UPDATE")
        .bind(invite.couple_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Couple not found".into()))?;

    let partner_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE couple_id = $1")
            .bind(couple.id)
            .fetch_one(&mut *tx)
            .await?;

    if partner_count >= 2 {
        return Err(AppError::FailedPrecondition(
            "Couple already has two partners".into(),
        ));
    }

    let (partner_id, partner_name) = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT u.id, u.display_name
        FROM players p JOIN users u ON u.id = p.user_id
        WHERE p.couple_id = $1
        "#,
    )
    .bind(couple.id)
    .fetch_one(&mut *tx)
    .await?;

    let now = Utc::now();

    sqlx::query(
        "UPDATE couples SET status = 'active', last_activity_at = $2 WHERE id = $1",
    )
    .bind(couple.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO players (couple_id, user_id, joined_at) VALUES ($1, $2, $3)")
        .bind(couple.id)
        .bind(auth_user.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE users SET initial = $2, active_couple_id = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(auth_user.id)
    .bind(&initial)
    .bind(couple.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE invite_codes SET status = 'used', used_by = $2, used_at = $3 WHERE code = $1",
    )
    .bind(&code)
    .bind(auth_user.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(couple_id = %couple.id, joiner_id = %auth_user.id, "Partner joined couple");

    Ok(Json(JoinCoupleResponse {
        couple_id: couple.id,
        partner_id,
        partner_name,
    }))
}

pub async fn get_couple(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CoupleView>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let players = sqlx::query_as::<_, Player>(
        "SELECT * FROM players WHERE couple_id = $1 ORDER BY joined_at ASC",
    )
    .bind(couple.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(CoupleView {
        couple,
        players: players.into_iter().map(PlayerView::from).collect(),
    }))
}

pub async fn update_couple(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateCoupleRequest>,
) -> AppResult<Json<Couple>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    if let Some(points) = body.points_per_acknowledgment {
        // Single-wraparound rule requires the award to stay below 100.
        if !(1..=99).contains(&points) {
            return Err(AppError::Validation(
                "points_per_acknowledgment must be between 1 and 99".into(),
            ));
        }
    }

    let updated = sqlx::query_as::<_, Couple>(
        r#"
        UPDATE couples SET
            anniversary_date = COALESCE($2, anniversary_date),
            points_per_acknowledgment = COALESCE($3, points_per_acknowledgment)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(couple.id)
    .bind(body.anniversary_date)
    .bind(body.points_per_acknowledgment)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated))
}
