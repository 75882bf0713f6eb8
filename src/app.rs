use crate::{commands, config::Config, db, handlers, state::AppState};
use anyhow::Result;
use dotenvy::dotenv;
use log::{info, warn};
use std::sync::Arc;
use teloxide::{dptree, prelude::*};

pub async fn run() -> Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    let bot = Bot::from_env();
    // На всякий случай — polling-only.
    bot.delete_webhook().await.ok();

    let cfg = Config::from_env();
    let pool = db::connect(&cfg.database_url).await?;
    let state = Arc::new(AppState::new(cfg, pool)?);

    info!("Starting telegram-warden…");

    if let Err(e) = commands::setup_commands(&bot, &state).await {
        warn!("не удалось установить меню команд: {e}");
    }
    notify_supers(&bot, &state, "🚀 Бот Запущен 🚀").await;

    // Регистрация хендлеров.
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::on_message))
        .branch(Update::filter_callback_query().endpoint(handlers::on_callback))
        .branch(Update::filter_my_chat_member().endpoint(handlers::on_chat_member_update));

    // Прокидываем зависимости в дерево.
    Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    notify_supers(&bot, &state, "🛑 Бот Остановлен 🛑").await;
    commands::delete_commands(&bot, &state).await;
    info!("telegram-warden stopped");
    Ok(())
}

/// Служебное уведомление супер-админам; ошибки доставки игнорируются.
async fn notify_supers(bot: &Bot, state: &AppState, text: &str) {
    let Ok(supers) = db::admins::supers(&state.db).await else {
        return;
    };
    for admin in supers {
        let _ = bot.send_message(ChatId(admin.user_id), text).await;
    }
}
