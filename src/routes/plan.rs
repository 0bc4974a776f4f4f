use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::AppError;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteItemRequest {
    minutes_spent: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemProgressRequest {
    minutes_spent: i64,
}

#[derive(Debug, Serialize)]
struct UpdateResult {
    updated: bool,
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/today", get(get_today).delete(clear_today))
        .route("/items/:id/complete", post(complete_item))
        .route("/items/:id/progress", post(update_progress))
}

async fn get_today(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let plan = state.plan().get_or_generate_todays_plan().await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: plan,
        message: None,
    }))
}

async fn complete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.minutes_spent.is_some_and(|m| m < 0) {
        return Err(AppError::validation("minutesSpent must not be negative"));
    }

    let updated = state
        .plan()
        .mark_item_complete(id, payload.minutes_spent)
        .await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: UpdateResult { updated },
        message: (!updated).then(|| "no plan item with that id for today".to_string()),
    }))
}

async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ItemProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.minutes_spent < 0 {
        return Err(AppError::validation("minutesSpent must not be negative"));
    }

    let updated = state
        .plan()
        .update_item_progress(id, payload.minutes_spent)
        .await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: UpdateResult { updated },
        message: (!updated).then(|| "no plan item with that id for today".to_string()),
    }))
}

#[derive(Debug, Serialize)]
struct ClearResult {
    removed: u64,
}

async fn clear_today(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let removed = state.plan().clear_todays_plan().await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: ClearResult { removed },
        message: None,
    }))
}
