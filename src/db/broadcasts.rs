// src/db/broadcasts.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::templates::TemplateButton;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Broadcast {
    pub id: i32,
    pub text: String,
    /// "text" | "photo" | "video" | "document"
    pub media_type: String,
    pub media_id: Option<String>,
    pub buttons: Json<Vec<TemplateButton>>,
    pub sent_at: DateTime<Utc>,
    pub sent_by: i64,
    pub success_count: i32,
    pub error_count: i32,
    pub total_users: i32,
}

pub async fn create(
    pool: &PgPool,
    text: &str,
    media_type: &str,
    media_id: Option<&str>,
    buttons: &[TemplateButton],
    sent_by: i64,
    total_users: i32,
) -> Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO broadcasts
         (text, media_type, media_id, buttons, sent_at, sent_by, total_users)
         VALUES ($1, $2, $3, $4, now(), $5, $6)
         RETURNING id",
    )
    .bind(text)
    .bind(media_type)
    .bind(media_id)
    .bind(Json(buttons))
    .bind(sent_by)
    .bind(total_users)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Счётчики накапливаются: повторная отправка доливает к прежним значениям.
pub async fn add_stats(pool: &PgPool, broadcast_id: i32, success: i32, errors: i32) -> Result<()> {
    sqlx::query(
        "UPDATE broadcasts SET
             success_count = success_count + $2,
             error_count = error_count + $3
         WHERE id = $1",
    )
    .bind(broadcast_id)
    .bind(success)
    .bind(errors)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, broadcast_id: i32) -> Result<Option<Broadcast>> {
    let broadcast = sqlx::query_as::<_, Broadcast>("SELECT * FROM broadcasts WHERE id = $1")
        .bind(broadcast_id)
        .fetch_optional(pool)
        .await?;
    Ok(broadcast)
}

pub async fn history(pool: &PgPool, limit: i64) -> Result<Vec<Broadcast>> {
    let broadcasts =
        sqlx::query_as::<_, Broadcast>("SELECT * FROM broadcasts ORDER BY sent_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(pool)
            .await?;
    Ok(broadcasts)
}
