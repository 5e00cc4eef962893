use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::couples::{active_couple_for, partner_of};
use crate::models::request::{
    request_limit_reached, ActiveRequestsInfo, CareRequest, CreateRequestRequest, RequestStatus,
    ACTIVE_REQUEST_LIMIT,
};
use crate::AppState;

pub async fn create_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateRequestRequest>,
) -> AppResult<Json<CareRequest>> {
    let action = body.action.trim().to_string();
    if action.is_empty() {
        return Err(AppError::Validation("Action is required".into()));
    }
    if body.for_player_id == auth_user.id {
        return Err(AppError::Validation(
            "Cannot make a request of yourself".into(),
        ));
    }

    let couple = active_couple_for(&state.db, auth_user.id).await?;
    let partner = partner_of(&state.db, couple.id, auth_user.id).await?;
    if partner != Some(body.for_player_id) {
        return Err(AppError::Validation("Invalid partner ID".into()));
    }

    let mut tx = state.db.begin().await?;

    // Lock the creator's player row so two concurrent creates cannot
    // both pass the limit check.
    sqlx::query("SELECT 1 FROM players WHERE couple_id = $1 AND user_id = $2 FOR UPDATE")
        .bind(couple.id)
        .bind(auth_user.id)
        .fetch_one(&mut *tx)
        .await?;

    let active_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM requests
        WHERE couple_id = $1 AND by_player_id = $2 AND status = 'active'
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .fetch_one(&mut *tx)
    .await?;

    if request_limit_reached(active_count) {
        return Err(AppError::FailedPrecondition(format!(
            "Request limit reached ({ACTIVE_REQUEST_LIMIT} active requests)"
        )));
    }

    let request = sqlx::query_as::<_, CareRequest>(
        r#"
        INSERT INTO requests (id, couple_id, by_player_id, for_player_id, action, description, category, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(body.for_player_id)
    .bind(&action)
    .bind(body.description.as_deref().map(str::trim))
    .bind(&body.category)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(request))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<CareRequest>>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let requests = sqlx::query_as::<_, CareRequest>(
        "SELECT * FROM requests WHERE couple_id = $1 ORDER BY created_at DESC",
    )
    .bind(couple.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

/// Cancel an active request. Statuses are terminal, so rather than a
/// hard delete the request moves to canceled and stays in history.
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<CareRequest>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let request = sqlx::query_as::<_, CareRequest>(
        "SELECT * FROM requests WHERE id = $1 AND couple_id = $2",
    )
    .bind(request_id)
    .bind(couple.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Request not found".into()))?;

    if request.by_player_id != auth_user.id {
        return Err(AppError::Forbidden(
            "Only the creator can cancel this request".into(),
        ));
    }
    if request.status != RequestStatus::Active {
        return Err(AppError::FailedPrecondition(
            "Only active requests can be canceled".into(),
        ));
    }

    // Status guard in the WHERE clause keeps the transition one-way
    // even if two cancels race.
    let updated = sqlx::query_as::<_, CareRequest>(
        r#"
        UPDATE requests SET status = 'canceled'
        WHERE id = $1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(request_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::FailedPrecondition(
        "Only active requests can be canceled".into(),
    ))?;

    Ok(Json(updated))
}

pub async fn active_requests_info(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ActiveRequestsInfo>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM requests
        WHERE couple_id = $1 AND by_player_id = $2 AND status = 'active'
        "#,
    )
    .bind(couple.id)
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ActiveRequestsInfo {
        count,
        remaining: (ACTIVE_REQUEST_LIMIT - count).max(0),
        limit: ACTIVE_REQUEST_LIMIT,
    }))
}
