use std::collections::HashSet;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{keys, MemoryCache};
use crate::db::Database;
use crate::services::plan_id::derive_plan_item_id;
use crate::services::planner::{fallback_plan, GenerativePlanner, PlannerContext};
use crate::services::progress::StreakInfo;
use crate::services::{catalog, plan_store, progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    VocabularyReview,
    Reading,
    Listening,
    Shadowing,
    Cloze,
    Translation,
    Conversation,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::VocabularyReview => "VOCABULARY_REVIEW",
            ActivityKind::Reading => "READING",
            ActivityKind::Listening => "LISTENING",
            ActivityKind::Shadowing => "SHADOWING",
            ActivityKind::Cloze => "CLOZE",
            ActivityKind::Translation => "TRANSLATION",
            ActivityKind::Conversation => "CONVERSATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "VOCABULARY_REVIEW" => Some(ActivityKind::VocabularyReview),
            "READING" => Some(ActivityKind::Reading),
            "LISTENING" => Some(ActivityKind::Listening),
            "SHADOWING" => Some(ActivityKind::Shadowing),
            "CLOZE" => Some(ActivityKind::Cloze),
            "TRANSLATION" => Some(ActivityKind::Translation),
            "CONVERSATION" => Some(ActivityKind::Conversation),
            _ => None,
        }
    }

    fn key_stem(&self) -> &'static str {
        match self {
            ActivityKind::VocabularyReview => "vocabularyReview",
            ActivityKind::Reading => "reading",
            ActivityKind::Listening => "listening",
            ActivityKind::Shadowing => "shadowing",
            ActivityKind::Cloze => "cloze",
            ActivityKind::Translation => "translation",
            ActivityKind::Conversation => "conversation",
        }
    }

    /// i18n key for the item card title; the client owns the actual copy.
    pub fn title_key(&self) -> String {
        format!("plan.{}.title", self.key_stem())
    }

    pub fn description_key(&self) -> String {
        format!("plan.{}.description", self.key_stem())
    }
}

/// Client navigation target for an activity. Kept out of the database;
/// recomputed on every reconstruction so route changes never require a
/// migration.
pub fn route_for(
    kind: ActivityKind,
    resource_id: Option<&str>,
    skill_id: Option<&str>,
) -> (String, serde_json::Value) {
    let path = match kind {
        ActivityKind::VocabularyReview => "/practice/vocabulary",
        ActivityKind::Reading => "/library/reading",
        ActivityKind::Listening => "/library/listening",
        ActivityKind::Shadowing => "/practice/shadowing",
        ActivityKind::Cloze => "/practice/cloze",
        ActivityKind::Translation => "/practice/translation",
        ActivityKind::Conversation => "/practice/conversation",
    };

    let mut params = serde_json::Map::new();
    if let Some(resource_id) = resource_id {
        params.insert("resourceId".to_string(), resource_id.into());
    }
    if let Some(skill_id) = skill_id {
        params.insert("skillId".to_string(), skill_id.into());
    }

    (path.to_string(), serde_json::Value::Object(params))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub id: Uuid,
    pub activity_kind: ActivityKind,
    pub title_key: String,
    pub description_key: String,
    pub estimated_minutes: i64,
    pub priority: i64,
    pub route: String,
    pub route_params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_due_count: Option<i64>,
    pub is_completed: bool,
    pub completed_at: Option<String>,
    pub minutes_spent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub generated_for_date: NaiveDate,
    pub items: Vec<PlanItem>,
    pub estimated_total_minutes: i64,
    pub completed_count: i64,
    pub total_count: i64,
    pub completion_percentage: f64,
    pub streak: StreakInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_titles_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_titles_summary: Option<String>,
    pub rationale: String,
}

impl Plan {
    pub fn new(generated_for_date: NaiveDate, items: Vec<PlanItem>, rationale: String) -> Self {
        let mut plan = Self {
            generated_for_date,
            items,
            estimated_total_minutes: 0,
            completed_count: 0,
            total_count: 0,
            completion_percentage: 0.0,
            streak: StreakInfo::default(),
            resource_titles_summary: None,
            skill_titles_summary: None,
            rationale,
        };
        plan.recompute_totals();
        plan
    }

    /// Completion is time-weighted: minutes spent over minutes estimated,
    /// capped at 100. Overruns on one item can cover for another, which is
    /// what a "how much of today's workload is done" number should do.
    pub fn recompute_totals(&mut self) {
        self.total_count = self.items.len() as i64;
        self.completed_count = self.items.iter().filter(|i| i.is_completed).count() as i64;
        self.estimated_total_minutes = self.items.iter().map(|i| i.estimated_minutes).sum();

        let estimated = self.estimated_total_minutes as f64;
        let spent: f64 = self.items.iter().map(|i| i.minutes_spent as f64).sum();
        self.completion_percentage = if estimated > 0.0 {
            let pct = (spent / estimated * 100.0).min(100.0);
            (pct * 100.0).round() / 100.0
        } else {
            0.0
        };
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Daily plan orchestrator: one plan per calendar day, cached in memory,
/// persisted as per-item completion records, regenerated through the
/// injected planner with a deterministic fallback.
pub struct PlanService<P: GenerativePlanner> {
    db: Database,
    cache: MemoryCache,
    planner: P,
}

impl<P: GenerativePlanner> PlanService<P> {
    pub fn new(db: Database, cache: MemoryCache, planner: P) -> Self {
        Self { db, cache, planner }
    }

    /// Resolution order: warm cache (same date only), durable records,
    /// fresh generation. Whatever path produced the plan, completion state
    /// is re-read from the records so the caller never sees stale progress.
    pub async fn get_or_generate_todays_plan(&self) -> Result<Plan, PlanError> {
        let today = Utc::now().date_naive();

        if let Some(cached) = self.cache.get::<Plan>(keys::daily_plan_key()) {
            if cached.generated_for_date == today {
                let mut plan = plan_store::enrich_with_latest(self.db.pool(), cached).await?;
                plan.streak = progress::streak(self.db.pool()).await?;
                self.cache.set(keys::daily_plan_key(), &plan, Duration::ZERO);
                return Ok(plan);
            }
            // Date rollover: yesterday's plan must never answer for today.
            self.cache.delete(keys::daily_plan_key());
        }

        if let Some(mut plan) = plan_store::reconstruct(self.db.pool(), today).await? {
            self.enrich_display(&mut plan).await?;
            plan.recompute_totals();
            self.cache.set(keys::daily_plan_key(), &plan, Duration::ZERO);
            return Ok(plan);
        }

        self.generate(today).await
    }

    /// Marks an item done and records time spent. Returns false when no
    /// record for today matches the id; unknown ids are logged and ignored
    /// rather than failing the request.
    pub async fn mark_item_complete(
        &self,
        item_id: Uuid,
        minutes_spent: Option<i64>,
    ) -> Result<bool, PlanError> {
        let today = Utc::now().date_naive();
        let updated =
            plan_store::complete_item(self.db.pool(), today, item_id, minutes_spent).await?;
        if !updated {
            warn!(item_id = %item_id, "completion for unknown plan item ignored");
            return Ok(false);
        }
        self.refresh_cached_plan(today).await?;
        Ok(true)
    }

    /// Partial-progress update; minutes only ever move up.
    pub async fn update_item_progress(
        &self,
        item_id: Uuid,
        minutes_spent: i64,
    ) -> Result<bool, PlanError> {
        let today = Utc::now().date_naive();
        let updated =
            plan_store::record_progress(self.db.pool(), today, item_id, minutes_spent).await?;
        if !updated {
            warn!(item_id = %item_id, "progress for unknown plan item ignored");
            return Ok(false);
        }
        self.refresh_cached_plan(today).await?;
        Ok(true)
    }

    /// Drops today's plan from cache and store so the next read regenerates.
    pub async fn clear_todays_plan(&self) -> Result<u64, PlanError> {
        let today = Utc::now().date_naive();
        self.cache.delete(keys::daily_plan_key());
        let removed = plan_store::delete_for_date(self.db.pool(), today).await?;
        info!(removed, "cleared today's plan");
        Ok(removed)
    }

    async fn generate(&self, today: NaiveDate) -> Result<Plan, PlanError> {
        let ctx = self.planner_context().await?;

        let generated = match self.planner.generate(&ctx).await {
            Ok(plan) if !plan.activities.is_empty() => plan,
            Ok(_) => {
                warn!("planner proposed no activities, falling back");
                fallback_plan(ctx.due_vocab_count)
            }
            Err(err) => {
                warn!(error = %err, "planner unavailable, falling back");
                fallback_plan(ctx.due_vocab_count)
            }
        };

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(generated.activities.len());
        for activity in generated.activities {
            let id = derive_plan_item_id(
                today,
                activity.activity_kind,
                activity.resource_id.as_deref(),
                activity.skill_id.as_deref(),
            );
            // Content-addressed ids make duplicate proposals collide here.
            if !seen.insert(id) {
                warn!(item_id = %id, "dropping duplicate proposed activity");
                continue;
            }
            let (route, route_params) = route_for(
                activity.activity_kind,
                activity.resource_id.as_deref(),
                activity.skill_id.as_deref(),
            );
            items.push(PlanItem {
                id,
                activity_kind: activity.activity_kind,
                title_key: activity.activity_kind.title_key(),
                description_key: activity.activity_kind.description_key(),
                estimated_minutes: activity.estimated_minutes,
                priority: activity.priority,
                route,
                route_params,
                resource_id: activity.resource_id,
                resource_title: None,
                difficulty_level: None,
                skill_id: activity.skill_id,
                skill_name: None,
                vocab_due_count: None,
                is_completed: false,
                completed_at: None,
                minutes_spent: 0,
            });
        }
        // Stable sort: equal priorities keep the planner's ordering.
        items.sort_by_key(|item| item.priority);

        let mut plan = Plan::new(today, items, generated.rationale);
        self.enrich_display(&mut plan).await?;
        plan.recompute_totals();

        plan_store::pre_create_records(self.db.pool(), &plan).await?;
        self.cache.set(keys::daily_plan_key(), &plan, Duration::ZERO);
        info!(
            items = plan.total_count,
            minutes = plan.estimated_total_minutes,
            "generated today's plan"
        );
        Ok(plan)
    }

    async fn planner_context(&self) -> Result<PlannerContext, PlanError> {
        let pool = self.db.pool();
        let aggregate = progress::overall_aggregate(pool).await?;
        Ok(PlannerContext {
            due_vocab_count: progress::due_vocab_count(pool).await?,
            seven_day_success_rate: progress::seven_day_success_rate(pool).await?,
            total_attempts: aggregate.total_attempts,
            average_mastery_score: aggregate.average_mastery_score,
            streak: progress::streak(pool).await?,
            resources: catalog::list_resources(pool).await?,
            skills: catalog::list_skills(pool).await?,
        })
    }

    /// Fills in everything that is display state rather than plan state:
    /// catalog titles, difficulty, live due counts, streak, summaries.
    async fn enrich_display(&self, plan: &mut Plan) -> Result<(), PlanError> {
        let pool = self.db.pool();
        let due = progress::due_vocab_count(pool).await?;

        for item in &mut plan.items {
            if let Some(resource_id) = item.resource_id.clone() {
                if let Some((title, difficulty)) = catalog::resource_meta(pool, &resource_id).await? {
                    item.resource_title = Some(title);
                    item.difficulty_level = difficulty;
                }
            }
            if let Some(skill_id) = item.skill_id.clone() {
                item.skill_name = catalog::skill_name(pool, &skill_id).await?;
            }
            if item.activity_kind == ActivityKind::VocabularyReview {
                item.vocab_due_count = Some(due);
            }
        }

        plan.streak = progress::streak(pool).await?;
        plan.resource_titles_summary =
            summarize_titles(plan.items.iter().filter_map(|i| i.resource_title.as_deref()));
        plan.skill_titles_summary =
            summarize_titles(plan.items.iter().filter_map(|i| i.skill_name.as_deref()));
        Ok(())
    }

    async fn refresh_cached_plan(&self, today: NaiveDate) -> Result<(), PlanError> {
        if let Some(cached) = self.cache.get::<Plan>(keys::daily_plan_key()) {
            if cached.generated_for_date == today {
                let plan = plan_store::enrich_with_latest(self.db.pool(), cached).await?;
                self.cache.set(keys::daily_plan_key(), &plan, Duration::ZERO);
            } else {
                self.cache.delete(keys::daily_plan_key());
            }
        }
        Ok(())
    }
}

fn summarize_titles<'a>(titles: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    let unique: Vec<&str> = titles.filter(|t| seen.insert(*t)).collect();
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ActivityKind, estimated: i64, spent: i64, done: bool) -> PlanItem {
        let (route, route_params) = route_for(kind, None, None);
        PlanItem {
            id: Uuid::new_v4(),
            activity_kind: kind,
            title_key: kind.title_key(),
            description_key: kind.description_key(),
            estimated_minutes: estimated,
            priority: 1,
            route,
            route_params,
            resource_id: None,
            resource_title: None,
            difficulty_level: None,
            skill_id: None,
            skill_name: None,
            vocab_due_count: None,
            is_completed: done,
            completed_at: None,
            minutes_spent: spent,
        }
    }

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            ActivityKind::VocabularyReview,
            ActivityKind::Reading,
            ActivityKind::Listening,
            ActivityKind::Shadowing,
            ActivityKind::Cloze,
            ActivityKind::Translation,
            ActivityKind::Conversation,
        ] {
            assert_eq!(ActivityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActivityKind::parse("KARAOKE"), None);
    }

    #[test]
    fn routes_carry_their_references() {
        let (route, params) = route_for(ActivityKind::Reading, Some("res-1"), None);
        assert_eq!(route, "/library/reading");
        assert_eq!(params["resourceId"], "res-1");

        let (route, params) = route_for(ActivityKind::Cloze, None, Some("sk-2"));
        assert_eq!(route, "/practice/cloze");
        assert_eq!(params["skillId"], "sk-2");

        let (_, params) = route_for(ActivityKind::VocabularyReview, None, None);
        assert!(params.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn completion_is_time_weighted() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let plan = Plan::new(
            date,
            vec![
                item(ActivityKind::Reading, 20, 20, true),
                item(ActivityKind::Cloze, 10, 0, false),
            ],
            String::new(),
        );
        assert_eq!(plan.estimated_total_minutes, 30);
        assert_eq!(plan.completed_count, 1);
        assert_eq!(plan.total_count, 2);
        assert!((plan.completion_percentage - 66.67).abs() < 0.01);
    }

    #[test]
    fn completion_percentage_is_capped() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let plan = Plan::new(
            date,
            vec![item(ActivityKind::Reading, 10, 45, true)],
            String::new(),
        );
        assert_eq!(plan.completion_percentage, 100.0);
    }

    #[test]
    fn empty_plan_has_zero_percentage() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let plan = Plan::new(date, vec![], String::new());
        assert_eq!(plan.completion_percentage, 0.0);
        assert_eq!(plan.estimated_total_minutes, 0);
    }

    #[test]
    fn title_keys_follow_the_kind() {
        assert_eq!(
            ActivityKind::VocabularyReview.title_key(),
            "plan.vocabularyReview.title"
        );
        assert_eq!(
            ActivityKind::Shadowing.description_key(),
            "plan.shadowing.description"
        );
    }
}
