// src/db/captcha.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Challenge {
    pub user_id: i64,
    pub text: String,
    pub attempts: i32,
    /// Сообщение с фото-капчей, которое редактируем при замене кода.
    pub message_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Создаёт задание либо заменяет текущее: текст и счётчик перезаписываются.
pub async fn upsert(pool: &PgPool, user_id: i64, text: &str, attempts: i32) -> Result<()> {
    sqlx::query(
        "INSERT INTO captcha (user_id, text, attempts)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id)
         DO UPDATE SET text = EXCLUDED.text, attempts = EXCLUDED.attempts",
    )
    .bind(user_id)
    .bind(text)
    .bind(attempts)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, user_id: i64) -> Result<Option<Challenge>> {
    let challenge = sqlx::query_as::<_, Challenge>("SELECT * FROM captcha WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(challenge)
}

/// Инкремент счётчика, возвращает новое значение.
pub async fn bump_attempts(pool: &PgPool, user_id: i64) -> Result<i32> {
    let attempts = sqlx::query_scalar::<_, i32>(
        "UPDATE captcha SET attempts = attempts + 1 WHERE user_id = $1 RETURNING attempts",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(attempts)
}

pub async fn set_message_id(pool: &PgPool, user_id: i64, message_id: i32) -> Result<()> {
    sqlx::query("UPDATE captcha SET message_id = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM captcha WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}
