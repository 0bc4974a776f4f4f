use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// An attempt counts as correct when its accuracy clears this bar.
pub const CORRECT_ACCURACY_THRESHOLD: f64 = 0.6;
/// Vocabulary entries at or above this mastery count as mastered.
pub const MASTERED_SCORE_THRESHOLD: f64 = 0.8;

const PRACTICE_HEAT_DAYS: i64 = 14;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateProgress {
    pub average_mastery_score: f64,
    pub total_attempts: i64,
    pub correct_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakInfo {
    pub current: i64,
    pub longest: i64,
    pub last_practice_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabSummary {
    pub total_entries: i64,
    pub due_count: i64,
    pub mastered_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeHeatPoint {
    pub date: String,
    pub attempts: i64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProgress {
    pub resource_id: String,
    pub title: String,
    #[serde(flatten)]
    pub aggregate: AggregateProgress,
}

pub fn format_timestamp(ts: chrono::DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn resource_aggregate(
    pool: &SqlitePool,
    resource_id: &str,
) -> Result<AggregateProgress, sqlx::Error> {
    aggregate_for_column(pool, "resourceId", resource_id).await
}

pub async fn skill_aggregate(
    pool: &SqlitePool,
    skill_id: &str,
) -> Result<AggregateProgress, sqlx::Error> {
    aggregate_for_column(pool, "skillId", skill_id).await
}

pub async fn overall_aggregate(pool: &SqlitePool) -> Result<AggregateProgress, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) as "total",
            COALESCE(AVG("accuracy"), 0.0) * 100.0 as "mastery",
            COALESCE(AVG(CASE WHEN "accuracy" >= $1 THEN 1.0 ELSE 0.0 END), 0.0) as "correctRate"
        FROM "attempts"
        "#,
    )
    .bind(CORRECT_ACCURACY_THRESHOLD)
    .fetch_one(pool)
    .await?;

    Ok(map_aggregate_row(&row))
}

async fn aggregate_for_column(
    pool: &SqlitePool,
    column: &str,
    id: &str,
) -> Result<AggregateProgress, sqlx::Error> {
    // `column` is one of two fixed identifiers, never user input.
    let query = format!(
        r#"
        SELECT
            COUNT(*) as "total",
            COALESCE(AVG("accuracy"), 0.0) * 100.0 as "mastery",
            COALESCE(AVG(CASE WHEN "accuracy" >= $1 THEN 1.0 ELSE 0.0 END), 0.0) as "correctRate"
        FROM "attempts"
        WHERE "{column}" = $2
        "#
    );

    let row = sqlx::query(&query)
        .bind(CORRECT_ACCURACY_THRESHOLD)
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(map_aggregate_row(&row))
}

fn map_aggregate_row(row: &sqlx::sqlite::SqliteRow) -> AggregateProgress {
    AggregateProgress {
        average_mastery_score: round2(row.try_get::<f64, _>("mastery").unwrap_or(0.0)),
        total_attempts: row.try_get::<i64, _>("total").unwrap_or(0),
        correct_rate: round2(row.try_get::<f64, _>("correctRate").unwrap_or(0.0)),
    }
}

/// Fraction of attempts in the trailing 7 days that were correct.
pub async fn seven_day_success_rate(pool: &SqlitePool) -> Result<f64, sqlx::Error> {
    let since = format_timestamp(Utc::now() - Duration::days(7));
    let rate: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG(CASE WHEN "accuracy" >= $1 THEN 1.0 ELSE 0.0 END), 0.0)
        FROM "attempts"
        WHERE "createdAt" >= $2
        "#,
    )
    .bind(CORRECT_ACCURACY_THRESHOLD)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(round2(rate))
}

pub async fn due_vocab_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let now = format_timestamp(Utc::now());
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "vocab_entries" WHERE "dueAt" <= $1"#)
        .bind(now)
        .fetch_one(pool)
        .await
}

pub async fn vocab_summary(pool: &SqlitePool) -> Result<VocabSummary, sqlx::Error> {
    let now = format_timestamp(Utc::now());
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) as "total",
            COALESCE(SUM(CASE WHEN "dueAt" <= $1 THEN 1 ELSE 0 END), 0) as "due",
            COALESCE(SUM(CASE WHEN "masteryScore" >= $2 THEN 1 ELSE 0 END), 0) as "mastered"
        FROM "vocab_entries"
        "#,
    )
    .bind(now)
    .bind(MASTERED_SCORE_THRESHOLD)
    .fetch_one(pool)
    .await?;

    Ok(VocabSummary {
        total_entries: row.try_get("total").unwrap_or(0),
        due_count: row.try_get("due").unwrap_or(0),
        mastered_count: row.try_get("mastered").unwrap_or(0),
    })
}

/// Daily attempt volume and accuracy over the trailing two weeks.
pub async fn practice_heat(pool: &SqlitePool) -> Result<Vec<PracticeHeatPoint>, sqlx::Error> {
    let since = format_timestamp(Utc::now() - Duration::days(PRACTICE_HEAT_DAYS));
    let rows = sqlx::query(
        r#"
        SELECT
            date("createdAt") as "date",
            COUNT(*) as "attempts",
            COALESCE(AVG(CASE WHEN "accuracy" >= $1 THEN 1.0 ELSE 0.0 END), 0.0) as "accuracy"
        FROM "attempts"
        WHERE "createdAt" >= $2
        GROUP BY date("createdAt")
        ORDER BY date("createdAt") ASC
        "#,
    )
    .bind(CORRECT_ACCURACY_THRESHOLD)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PracticeHeatPoint {
            date: row.try_get("date").unwrap_or_default(),
            attempts: row.try_get("attempts").unwrap_or(0),
            accuracy: round2(row.try_get("accuracy").unwrap_or(0.0)),
        })
        .collect())
}

pub async fn resource_progress(pool: &SqlitePool) -> Result<Vec<ResourceProgress>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
            r."id" as "resourceId",
            r."title" as "title",
            COUNT(a."id") as "total",
            COALESCE(AVG(a."accuracy"), 0.0) * 100.0 as "mastery",
            COALESCE(AVG(CASE WHEN a."accuracy" >= $1 THEN 1.0 ELSE 0.0 END), 0.0) as "correctRate"
        FROM "resources" r
        LEFT JOIN "attempts" a ON a."resourceId" = r."id"
        GROUP BY r."id", r."title"
        ORDER BY r."title" ASC
        "#,
    )
    .bind(CORRECT_ACCURACY_THRESHOLD)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ResourceProgress {
            resource_id: row.try_get("resourceId").unwrap_or_default(),
            title: row.try_get("title").unwrap_or_default(),
            aggregate: map_aggregate_row(&row),
        })
        .collect())
}

/// Current and longest run of consecutive practice days. SQLite has no
/// window-function CTE we can lean on here, so the scan happens over the
/// distinct-date list in Rust.
pub async fn streak(pool: &SqlitePool) -> Result<StreakInfo, sqlx::Error> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"SELECT DISTINCT date("createdAt") FROM "attempts" ORDER BY 1 ASC"#,
    )
    .fetch_all(pool)
    .await?;

    let dates: Vec<NaiveDate> = rows
        .iter()
        .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .collect();

    Ok(compute_streak(&dates, Utc::now().date_naive()))
}

/// Pure streak computation over sorted distinct practice dates. A streak is
/// still "current" if the last practice day was today or yesterday.
pub fn compute_streak(dates: &[NaiveDate], today: NaiveDate) -> StreakInfo {
    let Some(&last) = dates.last() else {
        return StreakInfo::default();
    };

    let mut longest = 1_i64;
    let mut run = 1_i64;
    for pair in dates.windows(2) {
        if pair[1] - pair[0] == Duration::days(1) {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    let current = if today - last <= Duration::days(1) { run } else { 0 };

    StreakInfo {
        current,
        longest,
        last_practice_date: Some(last),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
