//! Переписка поддержки: сообщения пользователей и ответы админов в одной таблице.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i32,
    pub user_id: i64,
    /// 'user' | 'admin'
    pub sender: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub admin_id: Option<i64>,
}

/// Сводка диалога: последнее сообщение + данные пользователя.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DialogPreview {
    pub user_id: i64,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub last_message: String,
    pub last_at: DateTime<Utc>,
    pub unread_count: i64,
}

pub async fn add_user_message(pool: &PgPool, user_id: i64, text: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO chat_messages (user_id, sender, message, is_read)
         VALUES ($1, 'user', $2, FALSE)",
    )
    .bind(user_id)
    .bind(text)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_admin_message(pool: &PgPool, user_id: i64, admin_id: i64, text: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO chat_messages (user_id, sender, message, admin_id, is_read)
         VALUES ($1, 'admin', $2, $3, TRUE)",
    )
    .bind(user_id)
    .bind(text)
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Последние `limit` сообщений, новые первыми (вывод разворачивает вызывающая сторона).
pub async fn history(pool: &PgPool, user_id: i64, limit: i64) -> Result<Vec<ChatMessage>> {
    let messages = sqlx::query_as::<_, ChatMessage>(
        "SELECT * FROM chat_messages
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

pub async fn mark_read(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE chat_messages
         SET is_read = TRUE
         WHERE user_id = $1 AND sender = 'user' AND is_read = FALSE",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Диалоги с непрочитанными сообщениями от пользователей.
pub async fn unread_dialogs(pool: &PgPool, limit: i64) -> Result<Vec<DialogPreview>> {
    let dialogs = sqlx::query_as::<_, DialogPreview>(
        "WITH ranked AS (
             SELECT cm.*,
                    ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY created_at DESC) AS rn
             FROM chat_messages cm
         ), unread AS (
             SELECT user_id, COUNT(*) AS unread_count
             FROM chat_messages
             WHERE sender = 'user' AND is_read = FALSE
             GROUP BY user_id
         )
         SELECT r.user_id,
                us.full_name,
                us.username,
                r.message    AS last_message,
                r.created_at AS last_at,
                u.unread_count
         FROM ranked r
         JOIN unread u ON r.user_id = u.user_id
         LEFT JOIN users us ON us.user_id = r.user_id
         WHERE r.rn = 1
         ORDER BY r.created_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(dialogs)
}

/// Последние диалоги независимо от статуса прочтения.
pub async fn recent_dialogs(pool: &PgPool, limit: i64) -> Result<Vec<DialogPreview>> {
    let dialogs = sqlx::query_as::<_, DialogPreview>(
        "WITH ranked AS (
             SELECT cm.*,
                    ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY created_at DESC) AS rn
             FROM chat_messages cm
         ), unread AS (
             SELECT user_id, COUNT(*) AS unread_count
             FROM chat_messages
             WHERE sender = 'user' AND is_read = FALSE
             GROUP BY user_id
         )
         SELECT r.user_id,
                us.full_name,
                us.username,
                r.message    AS last_message,
                r.created_at AS last_at,
                COALESCE(u.unread_count, 0) AS unread_count
         FROM ranked r
         LEFT JOIN unread u ON r.user_id = u.user_id
         LEFT JOIN users us ON us.user_id = r.user_id
         WHERE r.rn = 1
         ORDER BY r.created_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(dialogs)
}
