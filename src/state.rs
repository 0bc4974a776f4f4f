use std::sync::Arc;
use std::time::Instant;

use crate::cache::MemoryCache;
use crate::db::Database;
use crate::services::plan::PlanService;
use crate::services::planner::LlmPlanner;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db: Database,
    cache: MemoryCache,
    plan: Arc<PlanService<LlmPlanner>>,
}

impl AppState {
    pub fn new(db: Database, cache: MemoryCache, plan: PlanService<LlmPlanner>) -> Self {
        Self {
            started_at: Instant::now(),
            db,
            cache,
            plan: Arc::new(plan),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    pub fn plan(&self) -> &PlanService<LlmPlanner> {
        &self.plan
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
