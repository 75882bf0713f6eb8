// src/handlers/template_editor.rs
//
// Единый редактор двух шаблонов: приветствия и уведомления о смене канала.
// Экран выбирается по TemplateTarget, тексты экранов различаются точечно.
use anyhow::Result;
use log::info;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode, User as TgUser};
use teloxide::utils::html::escape;

use super::{ack, alert, callback_message, cleanup_dialog};
use crate::db;
use crate::dialogs::{Dialog, TemplateTarget};
use crate::keyboards;
use crate::notifier;
use crate::state::AppState;
use crate::templates::{self, ButtonKind, TemplateButton};

fn menu_text(target: TemplateTarget) -> &'static str {
    match target {
        TemplateTarget::Notification => {
            "📝 <b>Управление рассылкой</b>\n\n\
             Здесь вы можете настроить шаблон уведомления и запустить рассылку."
        }
        TemplateTarget::Welcome => {
            "👋 <b>Управление приветственным сообщением</b>\n\n\
             Здесь вы можете настроить сообщение, которое видят новые пользователи."
        }
    }
}

pub async fn edit_notification_command(
    bot: &Bot,
    state: Arc<AppState>,
    msg: &Message,
) -> Result<()> {
    send_menu(bot, &state, msg, TemplateTarget::Notification).await
}

pub async fn edit_welcome_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    send_menu(bot, &state, msg, TemplateTarget::Welcome).await
}

async fn send_menu(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    target: TemplateTarget,
) -> Result<()> {
    if let Some(from) = &msg.from {
        cleanup_dialog(bot, state, from.id).await;
    }
    bot.send_message(msg.chat.id, menu_text(target))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::template_menu(target))
        .await?;
    Ok(())
}

/// Экран меню шаблона; висящий предпросмотр при возврате удаляется.
pub async fn menu_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    cleanup_dialog(bot, state, q.from.id).await;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, menu_text(target))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::template_menu(target))
            .await?;
    }
    ack(bot, q).await
}

// ---------- текст ----------

pub async fn edit_text_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    let current = state.template_store(target).get().text;
    let prompt = match target {
        TemplateTarget::Notification => format!(
            "📝 <b>Редактирование текста рассылки</b>\n\n\
             Отправьте новый текст уведомления. Вы можете использовать плейсхолдеры:\n\
             • <code>&amp;title</code> - название канала\n\
             • <code>&amp;link</code> - ссылка на канал\n\n\
             Текущий текст:\n<pre>{}</pre>",
            escape(&current)
        ),
        TemplateTarget::Welcome => format!(
            "📝 <b>Редактирование текста приветствия</b>\n\n\
             Отправьте новый текст сообщения. Поддерживается HTML-разметка.\n\
             Воздержитесь от простых &lt;&gt; потому что бот воспринимает это как тег html\n\
             Используйте:\n\
             <code>&amp;link</code> - Актуальная ссылка на канал\n\
             <code>&amp;title</code> - Название канала\n\n\
             Текущий текст:\n<pre>{}</pre>",
            escape(&current)
        ),
    };
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, prompt)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_template(target))
            .await?;
    }
    state.set_dialog(q.from.id, Dialog::TemplateText { target });
    ack(bot, q).await
}

/// Новый текст шаблона (диалог `TemplateText`).
pub async fn on_template_text(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    target: TemplateTarget,
) -> Result<()> {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "❌ Отправьте текст сообщением").await?;
        return Ok(());
    };
    let text = text.to_string();
    state.template_store(target).update(|t| t.text = text)?;
    state.clear_dialog(from.id);

    let done = match target {
        TemplateTarget::Notification => "✅ Текст уведомления успешно обновлен!",
        TemplateTarget::Welcome => "✅ Текст приветствия успешно обновлен!",
    };
    bot.send_message(msg.chat.id, done).await?;
    Ok(())
}

// ---------- медиа ----------

pub async fn edit_media_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    let has_media = state.template_store(target).get().media_id.is_some();
    let status = if has_media {
        "✅ Медиа прикреплено"
    } else {
        "❌ Медиа отсутствует"
    };
    let text = format!(
        "🖼 <b>Управление медиа-контентом</b>\n\n\
         Текущий статус: {status}\n\n\
         Отправьте новое фото/видео/GIF-изображение или документ, либо нажмите кнопку удаления."
    );
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::template_media_menu(target, has_media))
            .await?;
    }
    state.set_dialog(q.from.id, Dialog::TemplateMedia { target });
    ack(bot, q).await
}

/// Вложение для шаблона (диалог `TemplateMedia`).
pub async fn on_template_media(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    target: TemplateTarget,
) -> Result<()> {
    let media = if let Some(photos) = msg.photo() {
        photos.last().map(|p| ("photo", p.file.id.0.clone()))
    } else if let Some(video) = msg.video() {
        Some(("video", video.file.id.0.clone()))
    } else if let Some(animation) = msg.animation() {
        Some(("animation", animation.file.id.0.clone()))
    } else if let Some(document) = msg.document() {
        Some(("document", document.file.id.0.clone()))
    } else {
        None
    };

    let Some((media_type, media_id)) = media else {
        bot.send_message(msg.chat.id, "❌ Неподдерживаемый тип медиа").await?;
        return Ok(());
    };

    state.template_store(target).update(|t| {
        t.media_type = Some(media_type.to_string());
        t.media_id = Some(media_id);
    })?;
    state.clear_dialog(from.id);
    bot.send_message(msg.chat.id, "✅ Медиа успешно обновлено!").await?;
    Ok(())
}

pub async fn remove_media(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    state.template_store(target).update(|t| {
        t.media_type = None;
        t.media_id = None;
    })?;
    state.clear_dialog(q.from.id);
    alert(bot, q, "✅ Медиа успешно удалено!").await?;
    // колбэк уже отвечен, просто перерисовываем меню шаблона
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, menu_text(target))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::template_menu(target))
            .await?;
    }
    Ok(())
}

// ---------- кнопки ----------

fn buttons_overview(target: TemplateTarget, buttons: &[TemplateButton]) -> String {
    let heading = match target {
        TemplateTarget::Notification => "🔘 <b>Управление кнопками уведомления</b>",
        TemplateTarget::Welcome => "🔘 <b>Управление кнопками приветствия</b>",
    };
    let body = if buttons.is_empty() {
        match target {
            TemplateTarget::Notification => "ℹ Кнопки в уведомлении не настроены".to_string(),
            TemplateTarget::Welcome => "ℹ Кнопки в сообщении не настроены".to_string(),
        }
    } else {
        let list = buttons
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let kind = match b.kind {
                    ButtonKind::Url => "🌐 Ссылка",
                    ButtonKind::Text => "💬 Текст",
                };
                format!("{}. {} ({kind})", i + 1, b.text)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("🔘 <b>Текущие кнопки:</b>\n\n{list}")
    };
    format!("{heading}\n\n{body}")
}

pub async fn manage_buttons_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    state.clear_dialog(q.from.id);
    let buttons = state.template_store(target).get().buttons;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, buttons_overview(target, &buttons))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::template_buttons_menu(target))
            .await?;
    }
    ack(bot, q).await
}

/// Перерисовка обзора кнопок после удаления/очистки (колбэк уже отвечен).
async fn redraw_buttons_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    let buttons = state.template_store(target).get().buttons;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, buttons_overview(target, &buttons))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::template_buttons_menu(target))
            .await?;
    }
    Ok(())
}

pub async fn add_button_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    state.clear_dialog(q.from.id);
    let prefix = target.prefix();
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "📌 Выберите тип кнопки:")
            .reply_markup(keyboards::button_kind_menu(
                prefix,
                Some(&format!("{prefix}_manage_buttons")),
            ))
            .await?;
    }
    ack(bot, q).await
}

pub async fn pick_button_kind(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
    kind: ButtonKind,
) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "✏️ Введите текст для кнопки:")
            .reply_markup(keyboards::back_to_add_button(target.prefix()))
            .await?;
    }
    state.set_dialog(q.from.id, Dialog::TemplateButtonLabel { target, kind });
    ack(bot, q).await
}

/// Название кнопки (диалог `TemplateButtonLabel`). 2..=20 символов.
pub async fn on_button_label(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    target: TemplateTarget,
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
        Dialog::TemplateButtonValue {
            target,
            kind,
            label,
        },
    );
    Ok(())
}

/// Значение кнопки — URL или текст ответа (диалог `TemplateButtonValue`).
pub async fn on_button_value(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    target: TemplateTarget,
    kind: ButtonKind,
    label: String,
) -> Result<()> {
    let value = msg.text().unwrap_or_default().trim().to_string();
    if kind == ButtonKind::Url && !value.starts_with("http://") && !value.starts_with("https://") {
        bot.send_message(msg.chat.id, "❌ URL должен начинаться с http:// или https://")
            .await?;
        return Ok(());
    }

    let added = state
        .template_store(target)
        .update(|t| t.add_button(TemplateButton::new(label, kind, value)))?;
    state.clear_dialog(from.id);

    let reply = if added {
        match kind {
            ButtonKind::Url => "✅ URL-кнопка успешно добавлена!",
            ButtonKind::Text => "✅ Текстовая кнопка успешно добавлена!",
        }
    } else {
        "❌ Не удалось добавить кнопку (превышен лимит?)"
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

pub async fn remove_button_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    let buttons = state.template_store(target).get().buttons;
    if buttons.is_empty() {
        return alert(bot, q, "ℹ Нет кнопок для удаления").await;
    }
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "❌ Выберите кнопку для удаления:")
            .reply_markup(keyboards::remove_buttons_list(&buttons, target.prefix()))
            .await?;
    }
    ack(bot, q).await
}

pub async fn remove_button(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
    index: usize,
) -> Result<()> {
    let removed = state.template_store(target).update(|t| t.remove_button(index))?;
    if removed {
        alert(bot, q, "✅ Кнопка успешно удалена!").await?;
    } else {
        alert(bot, q, "❌ Не удалось удалить кнопку").await?;
    }
    redraw_buttons_screen(bot, state, q, target).await
}

pub async fn clear_buttons(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    state.template_store(target).update(|t| t.buttons.clear())?;
    alert(bot, q, "✅ Все кнопки удалены!").await?;
    redraw_buttons_screen(bot, state, q, target).await
}

// ---------- предпросмотр и рассылка ----------

/// Показ шаблона как его увидит пользователь. Уведомление подставляет данные
/// резервного канала, приветствие показывается с плейсхолдерами как есть.
pub async fn preview(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
) -> Result<()> {
    let template = state.template_store(target).get();
    let Some((chat, msg_id)) = callback_message(q) else {
        return ack(bot, q).await;
    };

    let (header, text) = match target {
        TemplateTarget::Notification => {
            let Some(backup) = db::channels::get_backup(&state.db).await? else {
                bot.send_message(
                    chat,
                    "❌<b>РЕЗЕРВНЫЙ КАНАЛ НЕ НАСТРОЕН</b> ❌\n\n\
                     Пожалуйста добавьте его в ближайшее время",
                )
                .parse_mode(ParseMode::Html)
                .await?;
                return ack(bot, q).await;
            };
            (
                "👀 <b>Предпросмотр уведомления:</b>",
                template.fill(&backup.user_link(), &backup.title),
            )
        }
        TemplateTarget::Welcome => (
            "👀 <b>Предпросмотр приветственного сообщения:</b>",
            template.text.clone(),
        ),
    };

    let _ = bot.delete_message(chat, msg_id).await;
    bot.send_message(chat, header)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::back_to_template(target))
        .await?;

    match templates::send_template(bot, chat, &template, &text, target.prefix()).await {
        Ok(sent) => {
            state.set_dialog(
                q.from.id,
                Dialog::TemplatePreview {
                    chat,
                    msg: sent.id,
                },
            );
            ack(bot, q).await
        }
        Err(e) => alert(bot, q, &format!("❌ Ошибка при показе: {e}")).await,
    }
}

pub async fn send_confirm_screen(bot: &Bot, q: &CallbackQuery) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "Вы уверены, что хотите отправить это сообщение всем пользователям?",
        )
        .reply_markup(keyboards::confirm_send_menu())
        .await?;
    }
    ack(bot, q).await
}

/// Ручной запуск рассылки уведомления. Текст форматируется данными
/// резервного канала, получатели — все с включёнными уведомлениями.
pub async fn confirm_send(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let Some(backup) = db::channels::get_backup(&state.db).await? else {
        if let Some((chat, msg_id)) = callback_message(q) {
            bot.edit_message_text(
                chat,
                msg_id,
                "❌<b>РЕЗЕРВНЫЙ КАНАЛ НЕ НАСТРОЕН</b> ❌\n\n\
                 Пожалуйста добавьте его в ближайшее время",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_notification())
            .await?;
        }
        return ack(bot, q).await;
    };

    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, "⏳ Идёт рассылка...").await?;
    }
    ack(bot, q).await?;

    let template = state.notification.get();
    let report = notifier::send_notification_to_all(bot, &state.db, &template, &backup).await?;
    info!(
        "ручная рассылка уведомления (admin={}): успешно {}, ошибок {}",
        q.from.id, report.success, report.failures
    );

    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            format!(
                "✅ Рассылка завершена!\n\n\
                 • Успешно: {}\n\
                 • Ошибок: {}\n\
                 • Всего получателей: {}",
                report.success, report.failures, report.total
            ),
        )
        .reply_markup(keyboards::back_to_notification())
        .await?;
    }
    Ok(())
}
