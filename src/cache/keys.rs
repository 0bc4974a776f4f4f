use std::time::Duration;

/// Aggregates are cheap to recompute; keep them for a short window only.
pub const AGGREGATE_TTL: Duration = Duration::from_secs(5 * 60);

pub fn daily_plan_key() -> &'static str {
    "plan:daily"
}

pub fn vocab_summary_key() -> &'static str {
    "progress:vocab:summary"
}

pub fn practice_heat_key() -> &'static str {
    "progress:practice:heat"
}

pub fn resource_progress_key() -> &'static str {
    "progress:resources"
}

pub fn skill_progress_key(skill_id: &str) -> String {
    format!("progress:skill:{}", skill_id)
}
