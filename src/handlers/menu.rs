// src/handlers/menu.rs
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, Message, ParseMode};

use super::{ack, alert, callback_message, cleanup_dialog};
use crate::db;
use crate::keyboards;
use crate::state::AppState;

const PANEL_GREETING: &str = "👑 Добро пожаловать в админ-панель!";

/// /admin — панель отдельным сообщением.
pub async fn admin_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let level = state.admin_level(from).await?.unwrap_or(0);
    cleanup_dialog(bot, &state, from.id).await;
    bot.send_message(msg.chat.id, PANEL_GREETING)
        .reply_markup(keyboards::main_menu(level))
        .await?;
    Ok(())
}

/// Возврат в главное меню панели: текущий экран редактируется на месте.
pub async fn main_menu_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
) -> Result<()> {
    cleanup_dialog(bot, state, q.from.id).await;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, PANEL_GREETING)
            .reply_markup(keyboards::main_menu(level))
            .await?;
    }
    ack(bot, q).await
}

/// Файлы logs/*.log, новые сверху, без расширения.
fn log_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(std::time::SystemTime, String)> = entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension()? != "log" {
                return None;
            }
            let stem = path.file_stem()?.to_str()?.to_string();
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, stem))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));
    files.into_iter().map(|(_, name)| name).collect()
}

pub async fn logs_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    let names = log_files(&state.cfg.logs_dir);
    if names.is_empty() {
        bot.send_message(msg.chat.id, "❌ Файл логов не найден").await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, "📜 Выберите нужные логи бота")
        .reply_markup(keyboards::logs_list(&names))
        .await?;
    Ok(())
}

pub async fn logs_screen(bot: &Bot, state: &AppState, q: &CallbackQuery, level: i32) -> Result<()> {
    if level < 3 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    let names = log_files(&state.cfg.logs_dir);
    if names.is_empty() {
        return alert(bot, q, "❌ Файл логов не найден").await;
    }
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "📜 Выберите нужные логи бота")
            .reply_markup(keyboards::logs_list(&names))
            .await?;
    }
    ack(bot, q).await
}

/// Отправка одного лог-файла админу в личку.
pub async fn send_log(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    name: &str,
) -> Result<()> {
    if level < 3 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    // имя приходит из callback-данных, путь наружу каталога не пускаем
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return alert(bot, q, "❌ Файл логов не найден").await;
    }
    let path = state.cfg.logs_dir.join(format!("{name}.log"));
    if !path.is_file() {
        return alert(bot, q, "❌ Файл логов не найден").await;
    }
    bot.send_document(ChatId(q.from.id.0 as i64), InputFile::file(path))
        .caption(format!("✔ Файл логов за <b>{name}</b>"))
        .parse_mode(ParseMode::Html)
        .await?;
    ack(bot, q).await
}

pub async fn backup_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    bot.send_message(msg.chat.id, "⏳ Создание бэкапа...").await?;
    send_backup_file(bot, &state, msg.chat.id).await
}

pub async fn backup_screen(bot: &Bot, state: &AppState, q: &CallbackQuery, level: i32) -> Result<()> {
    if level < 3 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    bot.answer_callback_query(q.id.clone())
        .text("⏳ Создание бэкапа...")
        .await?;
    send_backup_file(bot, state, ChatId(q.from.id.0 as i64)).await
}

async fn send_backup_file(bot: &Bot, state: &AppState, chat: ChatId) -> Result<()> {
    let export = db::users::export_all_txt(&state.db).await?;
    if export.is_empty() {
        bot.send_message(chat, "ℹ База пользователей пуста").await?;
        return Ok(());
    }
    let file_name = format!("users_{}.txt", Utc::now().format("%Y-%m-%d"));
    bot.send_document(chat, InputFile::memory(export.into_bytes()).file_name(file_name))
        .caption("💾 Бэкап базы данных")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_files_filters_and_strips_extension() {
        let dir = std::env::temp_dir().join(format!("warden-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2025_08_01.log"), b"x").unwrap();
        std::fs::write(dir.join("2025_08_02.log"), b"x").unwrap();
        std::fs::write(dir.join("readme.txt"), b"x").unwrap();

        let names = log_files(&dir);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"2025_08_01".to_string()));
        assert!(names.iter().all(|n| !n.ends_with(".log")));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn log_files_missing_dir_is_empty() {
        assert!(log_files(Path::new("/nonexistent-warden-logs")).is_empty());
    }
}
