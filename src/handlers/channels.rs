// src/handlers/channels.rs
//
// Каналы попадают в базу автоматически: супер-админ добавляет бота в канал,
// бот регистрирует его и просит пригласительную ссылку в личке.
use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberUpdated, Message, ParseMode};
use teloxide::utils::html::escape;

use super::{ack, alert, callback_message};
use crate::db;
use crate::dialogs::Dialog;
use crate::keyboards;
use crate::notifier;
use crate::state::AppState;
use crate::utils;

const PER_PAGE: usize = 6;

pub async fn edit_channels_command(bot: &Bot, _state: Arc<AppState>, msg: &Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "📢 <b>Управление каналами</b>\n\nВыберите действие:",
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboards::channels_menu())
    .await?;
    Ok(())
}

pub async fn channels_menu_screen(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    state.clear_dialog(q.from.id);
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "📢 <b>Управление каналами</b>\n\nВыберите действие:",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::channels_menu())
        .await?;
    }
    ack(bot, q).await
}

fn pick_header(backup: bool) -> &'static str {
    if backup {
        "🔶 <b>Выберите резервный канал:</b> 🔶"
    } else {
        "🟢 <b>Выберите основной канал:</b> 🟢"
    }
}

fn pick_prefix(backup: bool) -> &'static str {
    if backup {
        "backup"
    } else {
        "main"
    }
}

/// Первый экран выбора: заголовок + текущий канал + первая страница списка.
pub async fn start_pick(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    backup: bool,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    let channels = db::channels::all(&state.db).await?;
    if channels.is_empty() {
        return alert(bot, q, "ℹ Нет доступных каналов").await;
    }

    let current = if backup {
        db::channels::get_backup(&state.db).await?
    } else {
        db::channels::get_main(&state.db).await?
    };
    let current_line = match &current {
        Some(c) => format!(
            "Текущий канал: <a href='{}'>{}</a>",
            c.user_link(),
            escape(&c.title)
        ),
        None => "Текущий канал: <b>НЕ УСТАНОВЛЕН</b>".to_string(),
    };

    let page = utils::paginate(&channels, 1, PER_PAGE);
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            format!("{}\n\n{current_line}", pick_header(backup)),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::channels_list(
            page.items,
            page.number,
            page.total_pages,
            pick_prefix(backup),
        ))
        .await?;
    }
    ack(bot, q).await
}

/// Листание списка: на страницах после первой остаётся только заголовок.
pub async fn paginate_pick(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    backup: bool,
    page_num: usize,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    let channels = db::channels::all(&state.db).await?;
    if channels.is_empty() {
        return alert(bot, q, "ℹ Нет доступных каналов").await;
    }

    let page = utils::paginate(&channels, page_num, PER_PAGE);
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, pick_header(backup))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::channels_list(
                page.items,
                page.number,
                page.total_pages,
                pick_prefix(backup),
            ))
            .await?;
    }
    ack(bot, q).await
}

pub async fn select_channel(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    backup: bool,
    channel_id: i64,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    let Some(channel) = db::channels::get(&state.db, channel_id).await? else {
        return alert(bot, q, "❌ Канал не найден").await;
    };

    let confirmation = if backup {
        db::channels::set_backup(&state.db, channel_id).await?;
        format!(
            "✅ Резервный канал установлен: <b>{}</b>",
            escape(&channel.title)
        )
    } else {
        db::channels::set_main(&state.db, channel_id).await?;
        format!(
            "✅ Основной канал установлен: <b>{}</b>",
            escape(&channel.title)
        )
    };
    info!(
        "канал {} ({}) назначен {} (admin={})",
        channel.channel_id,
        channel.title,
        if backup { "резервным" } else { "основным" },
        q.from.id
    );

    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, confirmation)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_main())
            .await?;
    }
    ack(bot, q).await
}

/// Бота добавили в канал. Регистрируем канал, только если добавлял
/// супер-админ, и просим его прислать пригласительную ссылку.
pub async fn on_bot_added(bot: &Bot, state: &AppState, upd: &ChatMemberUpdated) -> Result<()> {
    if !upd.chat.is_channel() {
        return Ok(());
    }
    let level = state.admin_level(&upd.from).await?.unwrap_or(0);
    if level < 2 {
        debug!(
            "бота добавил в канал {} не супер-админ (user={}), канал не регистрируем",
            upd.chat.id, upd.from.id
        );
        return Ok(());
    }

    let title = upd.chat.title().unwrap_or("Без названия");
    db::channels::insert_if_absent(&state.db, upd.chat.id.0, title, upd.chat.username()).await?;
    info!("бот добавлен в канал {} ({title})", upd.chat.id);

    bot.send_message(
        ChatId(upd.from.id.0 as i64),
        format!(
            "🤖 Вы добавили бота в канал!\n\
             Название: {}\n\
             ID: {}\n\n\
             <b>Теперь кликни на кнопку и отправь пригласительную ссылку для этого чата 👇</b>",
            escape(title),
            upd.chat.id.0
        ),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboards::channel_link_prompt(upd.chat.id.0))
    .await?;
    Ok(())
}

/// Кнопка «Отправить ссылку»: ждём следующее текстовое сообщение админа.
pub async fn link_prompt(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    channel_id: i64,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    if db::channels::get(&state.db, channel_id).await?.is_none() {
        return alert(bot, q, "❌ Канал не найден").await;
    }
    let Some((chat, msg_id)) = callback_message(q) else {
        return ack(bot, q).await;
    };
    bot.edit_message_reply_markup(chat, msg_id)
        .reply_markup(keyboards::channel_link_waiting())
        .await?;
    state.set_dialog(
        q.from.id,
        Dialog::ChannelLink {
            channel_id,
            prompt_chat: chat,
            prompt_msg: msg_id,
        },
    );
    ack(bot, q).await
}

/// Текст со ссылкой (диалог `ChannelLink`). Сообщение админа удаляется,
/// кнопка под приглашением меняется на «сохранено».
pub async fn on_channel_link(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    admin: UserId,
    channel_id: i64,
    prompt_chat: ChatId,
    prompt_msg: teloxide::types::MessageId,
) -> Result<()> {
    let link = msg.text().unwrap_or_default().trim();
    if link.is_empty() {
        bot.send_message(msg.chat.id, "❌ Отправьте ссылку текстом").await?;
        return Ok(());
    }

    db::channels::update_link(&state.db, channel_id, link).await?;
    let _ = bot.delete_message(msg.chat.id, msg.id).await;
    bot.edit_message_reply_markup(prompt_chat, prompt_msg)
        .reply_markup(keyboards::channel_link_saved())
        .await?;
    state.clear_dialog(admin);
    info!("ссылка канала {channel_id} обновлена (admin={admin})");
    Ok(())
}

/// Бота удалили из канала. Если канал был основным — по возможности
/// переключаемся на резервный и рассылаем уведомление, иначе бьём тревогу.
pub async fn on_bot_removed(bot: &Bot, state: &AppState, upd: &ChatMemberUpdated) -> Result<()> {
    if !upd.chat.is_channel() {
        return Ok(());
    }
    let Some(channel) = db::channels::get(&state.db, upd.chat.id.0).await? else {
        return Ok(());
    };
    info!("бот удалён из канала {} ({})", channel.channel_id, channel.title);

    if channel.is_main {
        let supers = db::admins::supers(&state.db).await?;
        match db::channels::get_backup(&state.db).await? {
            Some(backup) => {
                db::channels::set_main(&state.db, backup.channel_id).await?;
                let template = state.notification.get();
                let report =
                    notifier::notify_channel_change(bot, &state.db, &template, &backup).await?;

                let text = format!(
                    "⚠️ Основной канал {} был удален!\n\
                     Автоматически назначен новый основной канал: {}\n\
                     Уведомления отправлены {} пользователям\n\
                     Пользователи которым не удалось отправить уведомления: {}",
                    channel.title, backup.title, report.success, report.failures
                );
                for admin in &supers {
                    let _ = bot.send_message(ChatId(admin.user_id), &text).await;
                }
            }
            None => {
                let text = format!(
                    "🚨 КРИТИЧЕСКОЕ СОБЫТИЕ!\n\
                     Основной канал {} был удален, а резервный канал не настроен!\n\
                     Немедленно настройте новый канал!",
                    channel.title
                );
                for admin in &supers {
                    let _ = bot.send_message(ChatId(admin.user_id), &text).await;
                }
            }
        }
    }

    db::channels::delete(&state.db, channel.channel_id).await?;
    Ok(())
}
