// src/db/admins.rs
use anyhow::Result;
use sqlx::PgPool;

/// Уровни: 1 — обычный админ, 2 — супер-админ, 3 — разработчик.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Admin {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub level: i32,
}

pub async fn get(pool: &PgPool, user_id: i64) -> Result<Option<Admin>> {
    let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(admin)
}

/// `false` — уровень вне 1..=3 либо пользователь уже админ.
pub async fn add(
    pool: &PgPool,
    user_id: i64,
    username: Option<&str>,
    full_name: &str,
    level: i32,
) -> Result<bool> {
    if !(1..=3).contains(&level) {
        return Ok(false);
    }
    let res = sqlx::query(
        "INSERT INTO admins (user_id, username, full_name, level)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(username)
    .bind(full_name)
    .bind(level)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn remove(pool: &PgPool, user_id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM admins WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn set_level(pool: &PgPool, user_id: i64, level: i32) -> Result<bool> {
    if !(1..=3).contains(&level) {
        return Ok(false);
    }
    let res = sqlx::query("UPDATE admins SET level = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(level)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn all(pool: &PgPool) -> Result<Vec<Admin>> {
    let admins = sqlx::query_as::<_, Admin>("SELECT * FROM admins ORDER BY level DESC, user_id")
        .fetch_all(pool)
        .await?;
    Ok(admins)
}

/// Супер-админы (уровень 2 и выше) — им уходят служебные уведомления.
pub async fn supers(pool: &PgPool) -> Result<Vec<Admin>> {
    let admins = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE level >= 2")
        .fetch_all(pool)
        .await?;
    Ok(admins)
}
