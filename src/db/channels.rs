// src/db/channels.rs
use anyhow::Result;
use sqlx::PgPool;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Channel {
    pub channel_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub link: Option<String>,
    pub is_main: bool,
    pub is_backup: bool,
}

impl Channel {
    /// Ссылка для пользователя: сохранённый инвайт, @username
    /// или t.me/c/… по внутреннему id (для приватных каналов без инвайта).
    pub fn user_link(&self) -> String {
        if let Some(link) = &self.link {
            return link.clone();
        }
        if let Some(name) = &self.username {
            return format!("https://t.me/{name}");
        }
        let raw = self.channel_id.to_string();
        let internal = raw.strip_prefix("-100").unwrap_or(&raw);
        format!("https://t.me/c/{internal}")
    }
}

pub async fn get(pool: &PgPool, channel_id: i64) -> Result<Option<Channel>> {
    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE channel_id = $1")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?;
    Ok(channel)
}

pub async fn all(pool: &PgPool) -> Result<Vec<Channel>> {
    let channels = sqlx::query_as::<_, Channel>("SELECT * FROM channels ORDER BY title")
        .fetch_all(pool)
        .await?;
    Ok(channels)
}

pub async fn count(pool: &PgPool) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM channels")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Регистрирует канал, в который добавили бота. Повторное добавление — no-op.
pub async fn insert_if_absent(
    pool: &PgPool,
    channel_id: i64,
    title: &str,
    username: Option<&str>,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO channels (channel_id, title, username)
         VALUES ($1, $2, $3)
         ON CONFLICT (channel_id) DO NOTHING",
    )
    .bind(channel_id)
    .bind(title)
    .bind(username)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn update_link(pool: &PgPool, channel_id: i64, link: &str) -> Result<()> {
    sqlx::query("UPDATE channels SET link = $2 WHERE channel_id = $1")
        .bind(channel_id)
        .bind(link)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, channel_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM channels WHERE channel_id = $1")
        .bind(channel_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_main(pool: &PgPool) -> Result<Option<Channel>> {
    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE is_main = TRUE")
        .fetch_optional(pool)
        .await?;
    Ok(channel)
}

pub async fn get_backup(pool: &PgPool) -> Result<Option<Channel>> {
    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE is_backup = TRUE")
        .fetch_optional(pool)
        .await?;
    Ok(channel)
}

/// Основной канал всегда один: флаг снимается со всех и ставится выбранному.
pub async fn set_main(pool: &PgPool, channel_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE channels SET is_main = FALSE WHERE is_main = TRUE")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE channels SET is_main = TRUE, is_backup = FALSE WHERE channel_id = $1")
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn set_backup(pool: &PgPool, channel_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE channels SET is_backup = FALSE WHERE is_backup = TRUE")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE channels SET is_backup = TRUE WHERE channel_id = $1")
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
