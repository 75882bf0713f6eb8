//! Слой доступа к PostgreSQL: модуль на таблицу, свободные функции над `&PgPool`.

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod admins;
pub mod broadcasts;
pub mod captcha;
pub mod channels;
pub mod chat;
pub mod users;

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
