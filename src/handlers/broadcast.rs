// src/handlers/broadcast.rs
//
// Быстрая рассылка: контент -> кнопки (опционально) -> предпросмотр ->
// подтверждение -> отправка с записью в историю. История хранит копию
// содержимого, так что любую рассылку можно повторить или показать себе.
use anyhow::Result;
use log::info;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, Message, ParseMode, User as TgUser,
};
use teloxide::utils::html::escape;

use super::{ack, alert, callback_message, cleanup_dialog};
use crate::db::{self, broadcasts::Broadcast};
use crate::dialogs::{BroadcastDraft, Dialog};
use crate::keyboards;
use crate::notifier;
use crate::state::AppState;
use crate::templates::{ButtonKind, TemplateButton};
use crate::utils;

const MENU_TEXT: &str = "📢 <b>Управление рассылками</b>\n\n\
                         Здесь вы можете выполнить быструю рассылку или посмотреть историю.";

pub async fn broadcast_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    if let Some(from) = &msg.from {
        cleanup_dialog(bot, &state, from.id).await;
    }
    bot.send_message(msg.chat.id, MENU_TEXT)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::broadcast_menu())
        .await?;
    Ok(())
}

pub async fn menu_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    cleanup_dialog(bot, state, q.from.id).await;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, MENU_TEXT)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::broadcast_menu())
            .await?;
    }
    ack(bot, q).await
}

// ---------- составление ----------

pub async fn quick_start(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "✉️ <b>Быстрая рассылка</b>\n\n\
             Отправьте сообщение, которое будет разослано всем пользователям. \
             Можно использовать текст, фото, видео или документы.",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::back_to_broadcast())
        .await?;
    }
    state.set_dialog(q.from.id, Dialog::BroadcastContent);
    ack(bot, q).await
}

/// Сообщение-контент (диалог `BroadcastContent`): текст, фото, видео или документ.
pub async fn on_content(bot: &Bot, state: &AppState, msg: &Message, from: &TgUser) -> Result<()> {
    let caption = msg.caption().unwrap_or_default().to_string();
    let draft = if let Some(text) = msg.text() {
        BroadcastDraft {
            text: text.to_string(),
            ..Default::default()
        }
    } else if let Some(photos) = msg.photo() {
        let Some(photo) = photos.last() else {
            bot.send_message(msg.chat.id, "❌ Неподдерживаемый тип медиа").await?;
            return Ok(());
        };
        BroadcastDraft {
            text: caption,
            media_type: Some("photo".to_string()),
            media_id: Some(photo.file.id.0.clone()),
            buttons: Vec::new(),
        }
    } else if let Some(video) = msg.video() {
        BroadcastDraft {
            text: caption,
            media_type: Some("video".to_string()),
            media_id: Some(video.file.id.0.clone()),
            buttons: Vec::new(),
        }
    } else if let Some(document) = msg.document() {
        BroadcastDraft {
            text: caption,
            media_type: Some("document".to_string()),
            media_id: Some(document.file.id.0.clone()),
            buttons: Vec::new(),
        }
    } else {
        bot.send_message(msg.chat.id, "❌ Неподдерживаемый тип медиа").await?;
        return Ok(());
    };

    state.set_dialog(from.id, Dialog::BroadcastReady { draft });
    bot.send_message(
        msg.chat.id,
        "✅ Контент для рассылки получен. Хотите добавить кнопки?",
    )
    .reply_markup(keyboards::broadcast_buttons_offer())
    .await?;
    Ok(())
}

/// Достаёт черновик из текущего диалога; без него сценарий считается истёкшим.
/// Черновик живёт и в шагах ввода кнопки, откуда админ мог вернуться назад.
fn current_draft(state: &AppState, q: &CallbackQuery) -> Option<BroadcastDraft> {
    match state.dialog(q.from.id) {
        Some(Dialog::BroadcastReady { draft })
        | Some(Dialog::BroadcastButtonLabel { draft, .. })
        | Some(Dialog::BroadcastButtonValue { draft, .. }) => Some(draft),
        _ => None,
    }
}

pub async fn offer_buttons_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let Some(draft) = current_draft(state, q) else {
        return alert(bot, q, "❌ Черновик рассылки не найден, начните заново").await;
    };
    state.set_dialog(q.from.id, Dialog::BroadcastReady { draft });
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "✅ Контент для рассылки получен. Хотите добавить кнопки?",
        )
        .reply_markup(keyboards::broadcast_buttons_offer())
        .await?;
    }
    ack(bot, q).await
}

pub async fn add_button_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let Some(draft) = current_draft(state, q) else {
        return alert(bot, q, "❌ Черновик рассылки не найден, начните заново").await;
    };
    state.set_dialog(q.from.id, Dialog::BroadcastReady { draft });
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "📌 Выберите тип кнопки:")
            .reply_markup(keyboards::button_kind_menu(
                "broadcast",
                Some("broadcast_manage_buttons"),
            ))
            .await?;
    }
    ack(bot, q).await
}

pub async fn pick_button_kind(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    kind: ButtonKind,
) -> Result<()> {
    let Some(draft) = current_draft(state, q) else {
        return alert(bot, q, "❌ Черновик рассылки не найден, начните заново").await;
    };
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "✏️ Введите название кнопки:")
            .reply_markup(keyboards::back_to_add_button("broadcast"))
            .await?;
    }
    state.set_dialog(q.from.id, Dialog::BroadcastButtonLabel { draft, kind });
    ack(bot, q).await
}

/// Название кнопки (диалог `BroadcastButtonLabel`). 2..=20 символов.
pub async fn on_button_label(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    draft: BroadcastDraft,
    kind: ButtonKind,
) -> Result<()> {
    let label = msg.text().unwrap_or_default().trim().to_string();
    let len = label.chars().count();
    if len > 20 {
        bot.send_message(msg.chat.id, "❌ Текст кнопки не должен превышать 20 символов")
            .await?;
        return Ok(());
    }
    if len < 2 {
        bot.send_message(msg.chat.id, "❌ Текст кнопки должен быть не менее 2 символов")
            .await?;
        return Ok(());
    }

    let prompt = match kind {
        ButtonKind::Url => "🌐 Введите URL для кнопки:",
        ButtonKind::Text => "📝 Введите текст, который будет отправляться при нажатии на кнопку:",
    };
    bot.send_message(msg.chat.id, prompt).await?;
    state.set_dialog(
        from.id,
        Dialog::BroadcastButtonValue { draft, kind, label },
    );
    Ok(())
}

/// Значение кнопки (диалог `BroadcastButtonValue`).
pub async fn on_button_value(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    mut draft: BroadcastDraft,
    kind: ButtonKind,
    label: String,
) -> Result<()> {
    let value = msg.text().unwrap_or_default().trim().to_string();
    if kind == ButtonKind::Url && !value.starts_with("http://") && !value.starts_with("https://") {
        bot.send_message(msg.chat.id, "❌ URL должен начинаться с http:// или https://")
            .await?;
        return Ok(());
    }

    draft.buttons.push(TemplateButton::new(label, kind, value));
    state.set_dialog(from.id, Dialog::BroadcastReady { draft });

    let reply = match kind {
        ButtonKind::Url => "✅ URL-кнопка добавлена. Хотите добавить еще кнопку?",
        ButtonKind::Text => "✅ Текстовая кнопка добавлена. Хотите добавить еще кнопку?",
    };
    bot.send_message(msg.chat.id, reply)
        .reply_markup(keyboards::broadcast_add_another())
        .await?;
    Ok(())
}

/// Клавиатура предпросмотра: текстовые кнопки читают значение из черновика.
fn preview_keyboard(buttons: &[TemplateButton]) -> Option<InlineKeyboardMarkup> {
    if buttons.is_empty() {
        return None;
    }
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .iter()
        .filter_map(|b| match b.kind {
            ButtonKind::Url => {
                let url = b.value.parse().ok()?;
                Some(vec![InlineKeyboardButton::url(b.text.clone(), url)])
            }
            ButtonKind::Text => Some(vec![InlineKeyboardButton::callback(
                b.text.clone(),
                format!("preview_btn:{}", b.id),
            )]),
        })
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}

/// Кнопки добавлены (или пропущены): предпросмотр + вопрос-подтверждение.
pub async fn finish_buttons(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let Some(draft) = current_draft(state, q) else {
        return alert(bot, q, "❌ Черновик рассылки не найден, начните заново").await;
    };
    state.set_dialog(q.from.id, Dialog::BroadcastReady { draft: draft.clone() });
    let Some((chat, _)) = callback_message(q) else {
        return ack(bot, q).await;
    };

    notifier::send_broadcast_message(
        bot,
        chat,
        &draft.text,
        draft.media_type.as_deref().unwrap_or("text"),
        draft.media_id.as_deref(),
        preview_keyboard(&draft.buttons),
    )
    .await?;
    bot.send_message(
        chat,
        "Вы уверены, что хотите отправить это сообщение всем пользователям?",
    )
    .reply_markup(keyboards::broadcast_confirm_menu())
    .await?;
    ack(bot, q).await
}

/// Кнопка в предпросмотре: значение ещё не в БД, достаём из черновика.
pub async fn on_preview_button(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    button_id: &str,
) -> Result<()> {
    let button = current_draft(state, q)
        .and_then(|draft| draft.buttons.into_iter().find(|b| b.id == button_id));
    let Some(button) = button else {
        return alert(bot, q, "❌ Кнопка не найдена").await;
    };
    if let Some((chat, _)) = callback_message(q) {
        bot.send_message(chat, button.value).await?;
    }
    ack(bot, q).await
}

// ---------- отправка ----------

pub async fn confirm(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let Some(draft) = current_draft(state, q) else {
        return alert(bot, q, "❌ Черновик рассылки не найден, начните заново").await;
    };
    state.clear_dialog(q.from.id);
    ack(bot, q).await?;

    let total = db::users::recipients(&state.db).await?.len() as i32;
    let media_type = draft.media_type.as_deref().unwrap_or("text");
    let broadcast_id = db::broadcasts::create(
        &state.db,
        &draft.text,
        media_type,
        draft.media_id.as_deref(),
        &draft.buttons,
        q.from.id.0 as i64,
        total,
    )
    .await?;
    info!("рассылка #{broadcast_id} запущена (admin={})", q.from.id);

    let report = notifier::send_broadcast_to_all(
        bot,
        &state.db,
        broadcast_id,
        &draft.text,
        media_type,
        draft.media_id.as_deref(),
        &draft.buttons,
    )
    .await?;
    db::broadcasts::add_stats(&state.db, broadcast_id, report.success, report.failures).await?;

    if let Some((chat, _)) = callback_message(q) {
        bot.send_message(
            chat,
            format!(
                "✅ Рассылка завершена!\n\n\
                 • Успешно: {}\n\
                 • Ошибок: {}\n\
                 • Всего получателей: {}",
                report.success, report.failures, report.total
            ),
        )
        .reply_markup(keyboards::back_to_broadcast())
        .await?;
    }
    Ok(())
}

/// Повтор рассылки из истории: новая запись с тем же содержимым.
pub async fn repeat(bot: &Bot, state: &AppState, q: &CallbackQuery, broadcast_id: i32) -> Result<()> {
    let Some(broadcast) = db::broadcasts::get(&state.db, broadcast_id).await? else {
        return alert(bot, q, "❌ Рассылка не найдена").await;
    };
    ack(bot, q).await?;

    let total = db::users::recipients(&state.db).await?.len() as i32;
    let new_id = db::broadcasts::create(
        &state.db,
        &broadcast.text,
        &broadcast.media_type,
        broadcast.media_id.as_deref(),
        &broadcast.buttons,
        q.from.id.0 as i64,
        total,
    )
    .await?;
    info!(
        "повтор рассылки #{broadcast_id} как #{new_id} (admin={})",
        q.from.id
    );

    let report = notifier::send_broadcast_to_all(
        bot,
        &state.db,
        new_id,
        &broadcast.text,
        &broadcast.media_type,
        broadcast.media_id.as_deref(),
        &broadcast.buttons,
    )
    .await?;
    db::broadcasts::add_stats(&state.db, new_id, report.success, report.failures).await?;

    if let Some((chat, _)) = callback_message(q) {
        bot.send_message(
            chat,
            format!(
                "✅ Повторная рассылка завершена!\n\n\
                 • Успешно: {}\n\
                 • Ошибок: {}\n\
                 • Всего получателей: {}",
                report.success, report.failures, report.total
            ),
        )
        .reply_markup(keyboards::back_to_broadcast())
        .await?;
    }
    Ok(())
}

/// «Показать мне»: копия рассылки в чат админа с кнопкой скрытия.
pub async fn send_to_me(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    broadcast_id: i32,
) -> Result<()> {
    let Some(broadcast) = db::broadcasts::get(&state.db, broadcast_id).await? else {
        return alert(bot, q, "❌ Рассылка не найдена").await;
    };
    let Some((chat, _)) = callback_message(q) else {
        return ack(bot, q).await;
    };

    let mut rows = notifier::broadcast_keyboard(broadcast_id, &broadcast.buttons)
        .map(|kb| kb.inline_keyboard)
        .unwrap_or_default();
    rows.push(vec![InlineKeyboardButton::callback(
        "Скрыть",
        "delete_this_message",
    )]);

    notifier::send_broadcast_message(
        bot,
        chat,
        &broadcast.text,
        &broadcast.media_type,
        broadcast.media_id.as_deref(),
        Some(InlineKeyboardMarkup::new(rows)),
    )
    .await?;
    ack(bot, q).await
}

// ---------- история ----------

pub async fn history_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let broadcasts = db::broadcasts::history(&state.db, 10).await?;
    let Some((chat, msg_id)) = callback_message(q) else {
        return ack(bot, q).await;
    };

    if broadcasts.is_empty() {
        bot.edit_message_text(chat, msg_id, "📜 История рассылок пуста")
            .reply_markup(keyboards::back_to_broadcast())
            .await?;
        return ack(bot, q).await;
    }

    let mut text = String::from("📜 <b>Последние рассылки:</b>\n\n");
    for b in &broadcasts {
        text.push_str(&format!(
            "ID: {}\nДата: {}\nУспешно: {}/{}\n\n",
            b.id,
            b.sent_at.format("%d.%m.%Y %H:%M"),
            b.success_count,
            b.total_users
        ));
    }
    bot.edit_message_text(chat, msg_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::broadcast_history_list(&broadcasts))
        .await?;
    ack(bot, q).await
}

async fn details_card(state: &AppState, broadcast: &Broadcast) -> Result<String> {
    let admin_name = db::admins::get(&state.db, broadcast.sent_by)
        .await?
        .map(|a| a.full_name)
        .unwrap_or_else(|| "Администратор".to_string());

    let buttons_info = if broadcast.buttons.is_empty() {
        "Нет кнопок".to_string()
    } else {
        broadcast
            .buttons
            .iter()
            .map(|b| match b.kind {
                ButtonKind::Url => format!("🔗 {}: {}", b.text, b.value),
                ButtonKind::Text => format!("💬 {}: {}", b.text, utils::preview(&b.value, 33)),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let content: String = broadcast.text.chars().take(300).collect();
    let ellipsis = if broadcast.text.chars().count() > 300 {
        "..."
    } else {
        ""
    };

    Ok(format!(
        "📊 <b>Детали рассылки #{}</b>\n\n\
         📅 Дата: {}\n\
         👤 Администратор: <a href='tg://user?id={}'>{}</a>\n\
         ✅ Успешно: {}\n\
         ❌ Ошибок: {}\n\
         👥 Всего получателей: {}\n\
         📈 Процент доставки: {}%\n\n\
         🔘 <b>Кнопки:</b>\n{}\n\n\
         📝 <b>Содержание:</b>\n{}{}",
        broadcast.id,
        broadcast.sent_at.format("%d.%m.%Y %H:%M"),
        broadcast.sent_by,
        escape(&admin_name),
        broadcast.success_count,
        broadcast.error_count,
        broadcast.total_users,
        utils::delivery_rate(broadcast.success_count, broadcast.total_users),
        escape(&buttons_info),
        escape(&content),
        ellipsis
    ))
}

pub async fn details_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    broadcast_id: i32,
) -> Result<()> {
    let Some(broadcast) = db::broadcasts::get(&state.db, broadcast_id).await? else {
        return alert(bot, q, "❌ Рассылка не найдена").await;
    };
    if let Some((chat, msg_id)) = callback_message(q) {
        let card = details_card(state, &broadcast).await?;
        bot.edit_message_text(chat, msg_id, card)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::broadcast_details_menu(broadcast_id))
            .await?;
    }
    ack(bot, q).await
}

/// Текстовая кнопка в доставленной рассылке: значение читается из истории.
pub async fn on_broadcast_text_button(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    payload: &str,
) -> Result<()> {
    let Some((broadcast_id, button_id)) = payload.split_once(':') else {
        return alert(bot, q, "❌ Произошла ошибка").await;
    };
    let Ok(broadcast_id) = broadcast_id.parse::<i32>() else {
        return alert(bot, q, "❌ Произошла ошибка").await;
    };
    let Some(broadcast) = db::broadcasts::get(&state.db, broadcast_id).await? else {
        return alert(bot, q, "❌ Произошла ошибка").await;
    };
    let Some(button) = broadcast.buttons.iter().find(|b| b.id == button_id) else {
        return alert(bot, q, "❌ Произошла ошибка").await;
    };
    if let Some((chat, _)) = callback_message(q) {
        bot.send_message(chat, button.value.clone()).await?;
    }
    ack(bot, q).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn preview_keyboard_uses_draft_ids() {
        let buttons = vec![
            TemplateButton::new("Сайт", ButtonKind::Url, "https://example.com"),
            TemplateButton::new("Ответ", ButtonKind::Text, "привет"),
        ];
        let kb = preview_keyboard(&buttons).unwrap();
        assert_eq!(kb.inline_keyboard.len(), 2);
        match &kb.inline_keyboard[1][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => {
                assert_eq!(data, &format!("preview_btn:{}", buttons[1].id));
            }
            other => panic!("ожидался callback, получено {other:?}"),
        }
    }

    #[test]
    fn preview_keyboard_empty_for_no_buttons() {
        assert!(preview_keyboard(&[]).is_none());
    }
}
