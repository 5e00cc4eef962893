use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::couples::active_couple_for;
use crate::models::suggestion::{CreateSuggestionRequest, Suggestion};
use crate::AppState;

pub async fn create_suggestion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateSuggestionRequest>,
) -> AppResult<Json<Suggestion>> {
    let action = body.action.trim().to_string();
    if action.is_empty() {
        return Err(AppError::Validation("Action is required".into()));
    }

    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let suggestion = sqlx::query_as::<_, Suggestion>(
        r#"
        INSERT INTO suggestions (id, couple_id, by_player_id, action, description, category)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(couple.id)
    .bind(auth_user.id)
    .bind(&action)
    .bind(body.description.as_deref().map(str::trim))
    .bind(&body.category)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(suggestion))
}

pub async fn list_suggestions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Suggestion>>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let suggestions = sqlx::query_as::<_, Suggestion>(
        "SELECT * FROM suggestions WHERE couple_id = $1 ORDER BY created_at DESC",
    )
    .bind(couple.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(suggestions))
}

pub async fn delete_suggestion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(suggestion_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let couple = active_couple_for(&state.db, auth_user.id).await?;

    let suggestion = sqlx::query_as::<_, Suggestion>(
        "SELECT * FROM suggestions WHERE id = $1 AND couple_id = $2",
    )
    .bind(suggestion_id)
    .bind(couple.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Suggestion not found".into()))?;

    if suggestion.by_player_id != auth_user.id {
        return Err(AppError::Forbidden(
            "Only the author can delete this suggestion".into(),
        ));
    }

    sqlx::query("DELETE FROM suggestions WHERE id = $1")
        .bind(suggestion_id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}
