// src/db/users.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub is_active: bool,
    pub is_banned: bool,
    pub captcha_passed: bool,
    pub should_notify: bool,
    pub join_date: DateTime<Utc>,
    pub banned_when: Option<DateTime<Utc>>,
}

pub async fn get(pool: &PgPool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Возвращает существующую запись, либо создаёт новую из данных профиля.
pub async fn get_or_create(
    pool: &PgPool,
    user_id: i64,
    username: Option<&str>,
    full_name: &str,
) -> Result<User> {
    if let Some(user) = get(pool, user_id).await? {
        return Ok(user);
    }
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (user_id, username, full_name)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username
         RETURNING *",
    )
    .bind(user_id)
    .bind(username)
    .bind(full_name)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

/// Поиск по началу username (регистр не учитывается, без `@`).
pub async fn search_by_username(pool: &PgPool, query: &str, limit: i64) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE username IS NOT NULL AND LOWER(username) LIKE $1 || '%'
         LIMIT $2",
    )
    .bind(query.trim().to_lowercase())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Поиск по подстроке в имени и фамилии.
pub async fn search_by_nickname(pool: &PgPool, query: &str, limit: i64) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE LOWER(full_name) LIKE '%' || $1 || '%'
         LIMIT $2",
    )
    .bind(query.trim().to_lowercase())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Все, кому уходят рассылки: активен, не заблокирован, не отписан, капча пройдена.
pub async fn recipients(pool: &PgPool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE is_active = TRUE AND is_banned = FALSE
           AND should_notify = TRUE AND captcha_passed = TRUE",
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn ban(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE users
         SET is_banned = TRUE, is_active = FALSE, banned_when = now()
         WHERE user_id = $1",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unban(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE users
         SET is_banned = FALSE, is_active = TRUE, banned_when = NULL
         WHERE user_id = $1",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// `false` — пользователя с таким id нет.
pub async fn set_notify(pool: &PgPool, user_id: i64, status: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE users SET should_notify = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn mark_captcha_passed(pool: &PgPool, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET captcha_passed = TRUE WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_total(pool: &PgPool) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn count_active(pool: &PgPool) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE is_active = TRUE AND is_banned = FALSE",
    )
    .fetch_one(pool)
    .await?;
    Ok(n)
}

pub async fn count_banned(pool: &PgPool) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_banned = TRUE")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Новые пользователи за полуинтервал [start, end).
pub async fn count_joined_period(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE join_date >= $1 AND join_date < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

pub async fn count_active_period(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users
         WHERE is_active = TRUE AND join_date >= $1 AND join_date < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

pub async fn count_banned_period(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64> {
    let n = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users
         WHERE is_banned = TRUE AND banned_when >= $1 AND banned_when < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Выгрузка всех пользователей в текстовый отчёт для /backup.
pub async fn export_all_txt(pool: &PgPool) -> Result<String> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY join_date")
        .fetch_all(pool)
        .await?;

    let blocks: Vec<String> = users
        .iter()
        .map(|u| {
            format!(
                "ID: {}\nUsername: {}\nИмя: {}\nДата регистрации: {}\nАктивен: {}\nУведомления: {}\n----------------------------------------",
                u.user_id,
                u.username
                    .as_deref()
                    .map(|n| format!("@{n}"))
                    .unwrap_or_else(|| "нет".to_string()),
                u.full_name,
                u.join_date.format("%d.%m.%Y %H:%M"),
                if u.is_active { "🟢 Да" } else { "🔴 Нет" },
                if u.should_notify { "🟢 Включены" } else { "🔴 Выключены" },
            )
        })
        .collect();

    Ok(blocks.join("\n\n"))
}
