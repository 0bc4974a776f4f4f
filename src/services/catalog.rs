use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub id: String,
    pub title: String,
    pub difficulty_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRef {
    pub id: String,
    pub name: String,
}

/// Title plus difficulty in a single narrow lookup; plan enrichment needs
/// both and never the full resource row.
pub async fn resource_meta(
    pool: &SqlitePool,
    resource_id: &str,
) -> Result<Option<(String, Option<String>)>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT "title", "difficultyLevel" FROM "resources" WHERE "id" = $1"#)
        .bind(resource_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| {
        (
            row.try_get("title").unwrap_or_default(),
            row.try_get::<Option<String>, _>("difficultyLevel").ok().flatten(),
        )
    }))
}

pub async fn skill_name(pool: &SqlitePool, skill_id: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT "name" FROM "skills" WHERE "id" = $1"#)
        .bind(skill_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_resources(pool: &SqlitePool) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT "id", "title", "difficultyLevel" FROM "resources" ORDER BY "title" ASC"#)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ResourceRef {
            id: row.try_get("id").unwrap_or_default(),
            title: row.try_get("title").unwrap_or_default(),
            difficulty_level: row.try_get::<Option<String>, _>("difficultyLevel").ok().flatten(),
        })
        .collect())
}

pub async fn list_skills(pool: &SqlitePool) -> Result<Vec<SkillRef>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT "id", "name" FROM "skills" ORDER BY "name" ASC"#)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| SkillRef {
            id: row.try_get("id").unwrap_or_default(),
            name: row.try_get("name").unwrap_or_default(),
        })
        .collect())
}
