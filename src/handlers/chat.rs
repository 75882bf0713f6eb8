// src/handlers/chat.rs
//
// Переписка с пользователями: списки диалогов, история и ответ от имени
// админа. Ответ сначала сохраняется, затем доставляется; при ошибке
// доставки запись остаётся, а админ может повторить отправку.
use std::collections::HashMap;

use anyhow::Result;
use log::error;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode, User as TgUser};
use teloxide::utils::html::escape;

use super::{ack, alert, callback_message};
use crate::db::{self, chat::DialogPreview};
use crate::dialogs::Dialog;
use crate::keyboards;
use crate::state::AppState;
use crate::utils;

const LIST_LIMIT: i64 = 15;
const HISTORY_LIMIT: i64 = 30;

fn format_dialogs(title: &str, dialogs: &[DialogPreview]) -> String {
    if dialogs.is_empty() {
        return format!("{title}\n\n📭 Здесь пока пусто.");
    }

    let mut lines = vec![title.to_string(), String::new()];
    for (i, d) in dialogs.iter().enumerate() {
        let username = d
            .username
            .as_deref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| "без username".to_string());
        let name = d.full_name.as_deref().unwrap_or("Без имени");
        lines.push(format!(
            "{}. <b>{}</b> ({username})\nПоследнее: {}",
            i + 1,
            escape(name),
            d.last_at.format("%d.%m %H:%M")
        ));
        if d.unread_count > 0 {
            lines.push(format!("Непрочитанных: <b>{}</b>", d.unread_count));
        }
        lines.push(format!(
            "Сообщение: <i>{}</i>\n",
            escape(&utils::preview(&d.last_message, 60))
        ));
    }
    lines.join("\n")
}

/// История диалога, старые сообщения сверху. Имена админов кэшируются,
/// чтобы не ходить в БД по одному и тому же id на каждое сообщение.
async fn format_history(state: &AppState, user_id: i64) -> Result<String> {
    let user = db::users::get(&state.db, user_id).await?;
    let header_name = user
        .as_ref()
        .map(|u| escape(&u.full_name))
        .unwrap_or_else(|| user_id.to_string());
    let header_username = user
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .map(|u| format!(" (@{u})"))
        .unwrap_or_default();

    let mut messages = db::chat::history(&state.db, user_id, HISTORY_LIMIT).await?;
    messages.reverse();

    let mut lines = vec![
        format!("💬 <b>Диалог с {header_name}</b>{header_username}"),
        format!("ID: <code>{user_id}</code>"),
        String::new(),
    ];

    if messages.is_empty() {
        lines.push("Сообщений ещё не было.".to_string());
        return Ok(lines.join("\n"));
    }

    let mut admin_names: HashMap<i64, String> = HashMap::new();
    for m in &messages {
        let sender = if m.sender == "user" {
            "👤 Пользователь".to_string()
        } else {
            let name = match m.admin_id {
                Some(admin_id) => {
                    if !admin_names.contains_key(&admin_id) {
                        let name = db::admins::get(&state.db, admin_id)
                            .await?
                            .map(|a| a.full_name)
                            .unwrap_or_else(|| format!("Админ {admin_id}"));
                        admin_names.insert(admin_id, name);
                    }
                    admin_names[&admin_id].clone()
                }
                None => "Администратор".to_string(),
            };
            format!("👑 {name}")
        };
        lines.push(format!(
            "<code>{}</code> {sender}\n{}\n",
            m.created_at.format("%d.%m %H:%M"),
            escape(&m.message)
        ));
    }
    Ok(lines.join("\n"))
}

pub async fn menu_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    state.clear_dialog(q.from.id);
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "💬 <b>Диалоги с пользователями</b>\n\nВыберите раздел:",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::messages_menu())
        .await?;
    }
    ack(bot, q).await
}

pub async fn unread_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let dialogs = db::chat::unread_dialogs(&state.db, LIST_LIMIT).await?;
    list_screen(bot, q, "📥 <b>Непрочитанные диалоги</b>", &dialogs).await
}

pub async fn recent_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let dialogs = db::chat::recent_dialogs(&state.db, LIST_LIMIT).await?;
    list_screen(bot, q, "🕘 <b>Последние диалоги</b>", &dialogs).await
}

async fn list_screen(
    bot: &Bot,
    q: &CallbackQuery,
    title: &str,
    dialogs: &[DialogPreview],
) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        let markup = if dialogs.is_empty() {
            keyboards::messages_menu()
        } else {
            keyboards::dialogs_list(dialogs)
        };
        bot.edit_message_text(chat, msg_id, format_dialogs(title, dialogs))
            .parse_mode(ParseMode::Html)
            .reply_markup(markup)
            .await?;
    }
    ack(bot, q).await
}

pub async fn open_dialog(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
) -> Result<()> {
    let text = format_history(state, user_id).await?;
    db::chat::mark_read(&state.db, user_id).await?;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::dialog_controls(user_id))
            .await?;
    }
    ack(bot, q).await
}

pub async fn start_reply(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
) -> Result<()> {
    let Some(user) = db::users::get(&state.db, user_id).await? else {
        return alert(bot, q, "❌ Пользователь не найден").await;
    };
    if let Some((chat, _)) = callback_message(q) {
        bot.send_message(
            chat,
            format!(
                "✏️ <b>Введите сообщение для пользователя</b>\n\n\
                 Получатель: {} (ID: <code>{}</code>)",
                escape(&user.full_name),
                user.user_id
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::reply_cancel())
        .await?;
    }
    state.set_dialog(q.from.id, Dialog::SupportReply { user_id });
    ack(bot, q).await
}

/// Текст ответа (диалог `SupportReply`). При ошибке доставки диалог
/// не сбрасывается, админ может отправить снова.
pub async fn on_reply(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    user_id: i64,
) -> Result<()> {
    let text = msg.text().unwrap_or_default().trim().to_string();
    if text.is_empty() {
        bot.send_message(msg.chat.id, "❌ Сообщение не может быть пустым")
            .await?;
        return Ok(());
    }

    db::chat::add_admin_message(&state.db, user_id, from.id.0 as i64, &text).await?;
    let delivery = bot
        .send_message(
            ChatId(user_id),
            format!("📨 <b>Сообщение от администрации</b>\n\n{}", escape(&text)),
        )
        .parse_mode(ParseMode::Html)
        .await;
    if let Err(e) = delivery {
        error!("ошибка отправки ответа пользователю {user_id}: {e}");
        bot.send_message(msg.chat.id, "❌ Не удалось отправить сообщение")
            .await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, "✅ Сообщение отправлено пользователю")
        .await?;
    state.clear_dialog(from.id);

    let history = format_history(state, user_id).await?;
    bot.send_message(msg.chat.id, history)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::dialog_controls(user_id))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn preview(unread: i64) -> DialogPreview {
        DialogPreview {
            user_id: 42,
            full_name: Some("Ольга <Тест>".to_string()),
            username: None,
            last_message: "привет\nкак дела".to_string(),
            last_at: Utc::now(),
            unread_count: unread,
        }
    }

    #[test]
    fn dialogs_list_escapes_and_flattens() {
        let text = format_dialogs("📥 <b>Непрочитанные диалоги</b>", &[preview(3)]);
        assert!(text.contains("Ольга &lt;Тест&gt;"));
        assert!(text.contains("без username"));
        assert!(text.contains("Непрочитанных: <b>3</b>"));
        assert!(text.contains("привет как дела"));
    }

    #[test]
    fn dialogs_list_hides_zero_unread() {
        let text = format_dialogs("🕘 <b>Последние диалоги</b>", &[preview(0)]);
        assert!(!text.contains("Непрочитанных"));
    }

    #[test]
    fn empty_list_placeholder() {
        let text = format_dialogs("📥 <b>Непрочитанные диалоги</b>", &[]);
        assert!(text.ends_with("📭 Здесь пока пусто."));
    }
}
