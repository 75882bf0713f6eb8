mod app;
mod config;
mod state;
mod db;
mod templates;
mod dialogs;
mod keyboards;
mod notifier;
mod handlers;
mod commands;
mod captcha;
mod utils;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
