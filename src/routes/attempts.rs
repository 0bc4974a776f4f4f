use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::services::attempts::{self, AttemptInput};
use crate::services::plan::ActivityKind;
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
struct CreateAttemptRequest {
    activity_kind: String,
    vocab_id: Option<String>,
    resource_id: Option<String>,
    skill_id: Option<String>,
    input: Option<String>,
    accuracy: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptResponse {
    id: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_mastery_score: Option<f64>,
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/", post(create_attempt))
}

async fn create_attempt(
    State(state): State<AppState>,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(activity_kind) = ActivityKind::parse(&payload.activity_kind) else {
        return Err(AppError::validation(format!(
            "unknown activityKind: {}",
            payload.activity_kind
        )));
    };
    if !(0.0..=1.0).contains(&payload.accuracy) {
        return Err(AppError::validation("accuracy must be between 0 and 1"));
    }

    let recorded = attempts::record_attempt(
        state.db().pool(),
        state.cache(),
        AttemptInput {
            activity_kind,
            vocab_id: payload.vocab_id,
            resource_id: payload.resource_id,
            skill_id: payload.skill_id,
            input: payload.input,
            accuracy: payload.accuracy,
        },
    )
    .await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: AttemptResponse {
            id: recorded.id.to_string(),
            created_at: recorded.created_at,
            new_mastery_score: recorded.new_mastery_score,
        },
        message: None,
    }))
}
