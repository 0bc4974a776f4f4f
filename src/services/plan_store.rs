use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::services::plan::{route_for, ActivityKind, Plan, PlanItem};
use crate::services::progress::format_timestamp;

/// One durable completion record per plan item per day. The record carries
/// enough of the item to rebuild the plan after a restart; display-only
/// fields (titles, routes, due counts) are recomputed instead of stored.
#[derive(Debug, Clone)]
pub struct PlanCompletionRecord {
    pub date: NaiveDate,
    pub plan_item_id: Uuid,
    pub activity_kind: ActivityKind,
    pub resource_id: Option<String>,
    pub skill_id: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<String>,
    pub minutes_spent: i64,
    pub estimated_minutes: i64,
    pub priority: i64,
    pub title_key: String,
    pub description_key: String,
    pub rationale: String,
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Inserts a pristine record for every item of a freshly generated plan.
/// Existing records win: regeneration after a crash must not wipe progress
/// already logged today.
pub async fn pre_create_records(pool: &SqlitePool, plan: &Plan) -> Result<(), sqlx::Error> {
    let now = format_timestamp(Utc::now());
    let date = date_key(plan.generated_for_date);

    for item in &plan.items {
        sqlx::query(
            r#"
            INSERT INTO "plan_completion_records"
                ("date", "planItemId", "activityKind", "resourceId", "skillId",
                 "isCompleted", "completedAt", "minutesSpent", "estimatedMinutes",
                 "priority", "titleKey", "descriptionKey", "rationale",
                 "createdAt", "updatedAt")
            VALUES ($1, $2, $3, $4, $5, 0, NULL, 0, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT("date", "planItemId") DO NOTHING
            "#,
        )
        .bind(&date)
        .bind(item.id.to_string())
        .bind(item.activity_kind.as_str())
        .bind(&item.resource_id)
        .bind(&item.skill_id)
        .bind(item.estimated_minutes)
        .bind(item.priority)
        .bind(&item.title_key)
        .bind(&item.description_key)
        .bind(&plan.rationale)
        .bind(&now)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn load_records(
    pool: &SqlitePool,
    date: NaiveDate,
) -> Result<Vec<PlanCompletionRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "planItemId", "activityKind", "resourceId", "skillId",
               "isCompleted", "completedAt", "minutesSpent", "estimatedMinutes",
               "priority", "titleKey", "descriptionKey", "rationale"
        FROM "plan_completion_records"
        WHERE "date" = $1
        ORDER BY "priority" ASC, "planItemId" ASC
        "#,
    )
    .bind(date_key(date))
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_id: String = row.try_get("planItemId").unwrap_or_default();
        let Ok(plan_item_id) = Uuid::parse_str(&raw_id) else {
            warn!(id = %raw_id, "skipping record with malformed item id");
            continue;
        };
        let raw_kind: String = row.try_get("activityKind").unwrap_or_default();
        let Some(activity_kind) = ActivityKind::parse(&raw_kind) else {
            warn!(kind = %raw_kind, "skipping record with unknown activity kind");
            continue;
        };
        records.push(PlanCompletionRecord {
            date,
            plan_item_id,
            activity_kind,
            resource_id: row.try_get::<Option<String>, _>("resourceId").ok().flatten(),
            skill_id: row.try_get::<Option<String>, _>("skillId").ok().flatten(),
            is_completed: row.try_get::<i64, _>("isCompleted").unwrap_or(0) != 0,
            completed_at: row.try_get::<Option<String>, _>("completedAt").ok().flatten(),
            minutes_spent: row.try_get("minutesSpent").unwrap_or(0),
            estimated_minutes: row.try_get("estimatedMinutes").unwrap_or(0),
            priority: row.try_get("priority").unwrap_or(0),
            title_key: row.try_get("titleKey").unwrap_or_default(),
            description_key: row.try_get("descriptionKey").unwrap_or_default(),
            rationale: row.try_get("rationale").unwrap_or_default(),
        });
    }
    Ok(records)
}

/// Rebuilds the day's plan from its completion records, or None when the
/// day has none. Routes are recomputed, not read back.
pub async fn reconstruct(pool: &SqlitePool, date: NaiveDate) -> Result<Option<Plan>, sqlx::Error> {
    let records = load_records(pool, date).await?;
    if records.is_empty() {
        return Ok(None);
    }

    let rationale = records[0].rationale.clone();
    let items = records
        .into_iter()
        .map(|record| {
            let (route, route_params) = route_for(
                record.activity_kind,
                record.resource_id.as_deref(),
                record.skill_id.as_deref(),
            );
            PlanItem {
                id: record.plan_item_id,
                activity_kind: record.activity_kind,
                title_key: record.title_key,
                description_key: record.description_key,
                estimated_minutes: record.estimated_minutes,
                priority: record.priority,
                route,
                route_params,
                resource_id: record.resource_id,
                resource_title: None,
                difficulty_level: None,
                skill_id: record.skill_id,
                skill_name: None,
                vocab_due_count: None,
                is_completed: record.is_completed,
                completed_at: record.completed_at,
                minutes_spent: record.minutes_spent,
            }
        })
        .collect();

    Ok(Some(Plan::new(date, items, rationale)))
}

/// Overlays current completion state from the records onto a cached plan
/// and recomputes its totals. Items without a matching record keep what the
/// cache had.
pub async fn enrich_with_latest(pool: &SqlitePool, mut plan: Plan) -> Result<Plan, sqlx::Error> {
    let records = load_records(pool, plan.generated_for_date).await?;
    for item in &mut plan.items {
        if let Some(record) = records.iter().find(|r| r.plan_item_id == item.id) {
            item.is_completed = record.is_completed;
            item.completed_at = record.completed_at.clone();
            item.minutes_spent = record.minutes_spent;
        }
    }
    plan.recompute_totals();
    Ok(plan)
}

/// Marks an item complete. Minutes only move up and the first completion
/// timestamp sticks, so repeating the call is harmless. Returns whether a
/// record matched.
pub async fn complete_item(
    pool: &SqlitePool,
    date: NaiveDate,
    item_id: Uuid,
    minutes_spent: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let now = format_timestamp(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE "plan_completion_records"
        SET "isCompleted" = 1,
            "completedAt" = COALESCE("completedAt", $3),
            "minutesSpent" = MAX("minutesSpent", $4),
            "updatedAt" = $3
        WHERE "date" = $1 AND "planItemId" = $2
        "#,
    )
    .bind(date_key(date))
    .bind(item_id.to_string())
    .bind(&now)
    .bind(minutes_spent.unwrap_or(0).max(0))
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Raises the minutes-spent watermark without completing the item.
pub async fn record_progress(
    pool: &SqlitePool,
    date: NaiveDate,
    item_id: Uuid,
    minutes_spent: i64,
) -> Result<bool, sqlx::Error> {
    let now = format_timestamp(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE "plan_completion_records"
        SET "minutesSpent" = MAX("minutesSpent", $3),
            "updatedAt" = $4
        WHERE "date" = $1 AND "planItemId" = $2
        "#,
    )
    .bind(date_key(date))
    .bind(item_id.to_string())
    .bind(minutes_spent.max(0))
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_for_date(pool: &SqlitePool, date: NaiveDate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "plan_completion_records" WHERE "date" = $1"#)
        .bind(date_key(date))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
