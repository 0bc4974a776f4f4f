use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{keys, MemoryCache};
use crate::services::plan::ActivityKind;
use crate::services::progress::format_timestamp;

/// Mastery moves as an exponential average so one bad attempt cannot erase
/// a long history.
const MASTERY_CARRY_WEIGHT: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct AttemptInput {
    pub activity_kind: ActivityKind,
    pub vocab_id: Option<String>,
    pub resource_id: Option<String>,
    pub skill_id: Option<String>,
    pub input: Option<String>,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct RecordedAttempt {
    pub id: Uuid,
    pub created_at: String,
    pub new_mastery_score: Option<f64>,
}

/// Persists one practice attempt, folds it into the vocabulary mastery
/// model when it references an entry, and drops the progress caches that
/// just went stale. The attempt row is the source of truth; a failed
/// mastery update is logged but never loses the attempt.
pub async fn record_attempt(
    pool: &SqlitePool,
    cache: &MemoryCache,
    input: AttemptInput,
) -> Result<RecordedAttempt, sqlx::Error> {
    let id = Uuid::new_v4();
    let created_at = format_timestamp(Utc::now());
    let accuracy = input.accuracy.clamp(0.0, 1.0);

    sqlx::query(
        r#"
        INSERT INTO "attempts"
            ("id", "activityKind", "vocabId", "resourceId", "skillId", "input", "accuracy", "createdAt")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id.to_string())
    .bind(input.activity_kind.as_str())
    .bind(&input.vocab_id)
    .bind(&input.resource_id)
    .bind(&input.skill_id)
    .bind(&input.input)
    .bind(accuracy)
    .bind(&created_at)
    .execute(pool)
    .await?;

    let mut new_mastery_score = None;
    if let Some(vocab_id) = input.vocab_id.as_deref() {
        match update_vocab_mastery(pool, vocab_id, accuracy).await {
            Ok(score) => new_mastery_score = score,
            Err(err) => {
                warn!(vocab_id, error = %err, "mastery update failed after attempt insert");
            }
        }
    }

    cache.delete(keys::vocab_summary_key());
    cache.delete(keys::practice_heat_key());
    cache.delete(keys::resource_progress_key());
    if let Some(skill_id) = input.skill_id.as_deref() {
        cache.delete(&keys::skill_progress_key(skill_id));
    }

    Ok(RecordedAttempt {
        id,
        created_at,
        new_mastery_score,
    })
}

async fn update_vocab_mastery(
    pool: &SqlitePool,
    vocab_id: &str,
    accuracy: f64,
) -> Result<Option<f64>, sqlx::Error> {
    let current: Option<f64> =
        sqlx::query_scalar(r#"SELECT "masteryScore" FROM "vocab_entries" WHERE "id" = $1"#)
            .bind(vocab_id)
            .fetch_optional(pool)
            .await?;

    let Some(current) = current else {
        warn!(vocab_id, "attempt references unknown vocab entry");
        return Ok(None);
    };

    let updated = MASTERY_CARRY_WEIGHT * current + (1.0 - MASTERY_CARRY_WEIGHT) * accuracy;
    let due_at = format_timestamp(Utc::now() + Duration::days(next_review_interval_days(updated)));

    sqlx::query(
        r#"UPDATE "vocab_entries" SET "masteryScore" = $2, "dueAt" = $3 WHERE "id" = $1"#,
    )
    .bind(vocab_id)
    .bind(updated)
    .bind(due_at)
    .execute(pool)
    .await?;

    Ok(Some(updated))
}

/// Coarse spacing schedule: well-known entries wait a week, shaky ones
/// come back tomorrow.
fn next_review_interval_days(mastery_score: f64) -> i64 {
    if mastery_score >= 0.8 {
        7
    } else if mastery_score >= 0.6 {
        3
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn seed_vocab(pool: &SqlitePool, id: &str, score: f64) {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            r#"INSERT INTO "vocab_entries" ("id", "term", "masteryScore", "dueAt", "createdAt")
               VALUES ($1, $2, $3, $4, $4)"#,
        )
        .bind(id)
        .bind("ubiquitous")
        .bind(score)
        .bind(&now)
        .execute(pool)
        .await
        .expect("seed vocab");
    }

    #[tokio::test]
    async fn attempt_is_persisted_with_clamped_accuracy() {
        let db = Database::in_memory().await.expect("db");
        let cache = MemoryCache::new();

        let recorded = record_attempt(
            db.pool(),
            &cache,
            AttemptInput {
                activity_kind: ActivityKind::Cloze,
                vocab_id: None,
                resource_id: None,
                skill_id: Some("sk-grammar".to_string()),
                input: Some("answer".to_string()),
                accuracy: 1.7,
            },
        )
        .await
        .expect("record");

        let stored: f64 = sqlx::query_scalar(r#"SELECT "accuracy" FROM "attempts" WHERE "id" = $1"#)
            .bind(recorded.id.to_string())
            .fetch_one(db.pool())
            .await
            .expect("fetch");
        assert_eq!(stored, 1.0);
        assert!(recorded.new_mastery_score.is_none());
    }

    #[tokio::test]
    async fn mastery_moves_as_an_average() {
        let db = Database::in_memory().await.expect("db");
        let cache = MemoryCache::new();
        seed_vocab(db.pool(), "v-1", 0.5).await;

        let recorded = record_attempt(
            db.pool(),
            &cache,
            AttemptInput {
                activity_kind: ActivityKind::VocabularyReview,
                vocab_id: Some("v-1".to_string()),
                resource_id: None,
                skill_id: None,
                input: None,
                accuracy: 1.0,
            },
        )
        .await
        .expect("record");

        let score = recorded.new_mastery_score.expect("mastery updated");
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_vocab_does_not_fail_the_attempt() {
        let db = Database::in_memory().await.expect("db");
        let cache = MemoryCache::new();

        let recorded = record_attempt(
            db.pool(),
            &cache,
            AttemptInput {
                activity_kind: ActivityKind::VocabularyReview,
                vocab_id: Some("missing".to_string()),
                resource_id: None,
                skill_id: None,
                input: None,
                accuracy: 0.9,
            },
        )
        .await
        .expect("record");
        assert!(recorded.new_mastery_score.is_none());
    }

    #[tokio::test]
    async fn attempt_invalidates_progress_caches() {
        let db = Database::in_memory().await.expect("db");
        let cache = MemoryCache::new();
        cache.set(keys::vocab_summary_key(), &1_i64, std::time::Duration::ZERO);
        cache.set(keys::practice_heat_key(), &1_i64, std::time::Duration::ZERO);

        record_attempt(
            db.pool(),
            &cache,
            AttemptInput {
                activity_kind: ActivityKind::Reading,
                vocab_id: None,
                resource_id: Some("res-1".to_string()),
                skill_id: None,
                input: None,
                accuracy: 0.8,
            },
        )
        .await
        .expect("record");

        assert_eq!(cache.get::<i64>(keys::vocab_summary_key()), None);
        assert_eq!(cache.get::<i64>(keys::practice_heat_key()), None);
    }

    #[test]
    fn review_intervals_widen_with_mastery() {
        assert_eq!(next_review_interval_days(0.9), 7);
        assert_eq!(next_review_interval_days(0.7), 3);
        assert_eq!(next_review_interval_days(0.2), 1);
    }
}
