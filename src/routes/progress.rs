use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use serde::Serialize;

use crate::cache::keys;
use crate::response::AppError;
use crate::services::progress::{
    self, AggregateProgress, PracticeHeatPoint, ResourceProgress, StreakInfo, VocabSummary,
};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressSummaryResponse {
    overall: AggregateProgress,
    seven_day_success_rate: f64,
    streak: StreakInfo,
    vocab: VocabSummary,
    practice_heat: Vec<PracticeHeatPoint>,
    resources: Vec<ResourceProgress>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SkillProgressResponse {
    skill_id: String,
    #[serde(flatten)]
    aggregate: AggregateProgress,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceProgressResponse {
    resource_id: String,
    #[serde(flatten)]
    aggregate: AggregateProgress,
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/summary", get(summary))
        .route("/skills/:id", get(skill))
        .route("/resources/:id", get(resource))
}

/// Heavy aggregates (vocab summary, heat map, per-resource rollup) come
/// through the short-TTL cache; the cheap ones are computed per request.
async fn summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let pool = state.db().pool();
    let cache = state.cache();

    let vocab = match cache.get::<VocabSummary>(keys::vocab_summary_key()) {
        Some(cached) => cached,
        None => {
            let fresh = progress::vocab_summary(pool).await?;
            cache.set(keys::vocab_summary_key(), &fresh, keys::AGGREGATE_TTL);
            fresh
        }
    };

    let practice_heat = match cache.get::<Vec<PracticeHeatPoint>>(keys::practice_heat_key()) {
        Some(cached) => cached,
        None => {
            let fresh = progress::practice_heat(pool).await?;
            cache.set(keys::practice_heat_key(), &fresh, keys::AGGREGATE_TTL);
            fresh
        }
    };

    let resources = match cache.get::<Vec<ResourceProgress>>(keys::resource_progress_key()) {
        Some(cached) => cached,
        None => {
            let fresh = progress::resource_progress(pool).await?;
            cache.set(keys::resource_progress_key(), &fresh, keys::AGGREGATE_TTL);
            fresh
        }
    };

    let response = ProgressSummaryResponse {
        overall: progress::overall_aggregate(pool).await?,
        seven_day_success_rate: progress::seven_day_success_rate(pool).await?,
        streak: progress::streak(pool).await?,
        vocab,
        practice_heat,
        resources,
    };

    Ok(Json(SuccessResponse {
        success: true,
        data: response,
        message: None,
    }))
}

async fn skill(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cache_key = keys::skill_progress_key(&skill_id);
    let aggregate = match state.cache().get::<AggregateProgress>(&cache_key) {
        Some(cached) => cached,
        None => {
            let fresh = progress::skill_aggregate(state.db().pool(), &skill_id).await?;
            state.cache().set(&cache_key, &fresh, keys::AGGREGATE_TTL);
            fresh
        }
    };

    Ok(Json(SuccessResponse {
        success: true,
        data: SkillProgressResponse {
            skill_id,
            aggregate,
        },
        message: None,
    }))
}

async fn resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let aggregate = progress::resource_aggregate(state.db().pool(), &resource_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        data: ResourceProgressResponse {
            resource_id,
            aggregate,
        },
        message: None,
    }))
}
