pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::Database;
use crate::services::plan::PlanService;
use crate::services::planner::LlmPlanner;
use crate::state::AppState;

pub async fn create_app(config: &Config) -> Result<axum::Router, sqlx::Error> {
    let db = Database::connect(&config.database_url).await?;
    let cache = MemoryCache::new();
    let plan = PlanService::new(db.clone(), cache.clone(), LlmPlanner::new(config.planner.clone()));
    let state = AppState::new(db, cache, plan);

    Ok(routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
