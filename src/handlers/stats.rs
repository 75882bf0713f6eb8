// src/handlers/stats.rs
//
// Статистика: сводная карточка, произвольный период через диалог и
// отчёт по дням. Конец периода включительный, границы считаются по UTC.
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode, User as TgUser};
use teloxide::utils::html::escape;

use super::{ack, callback_message};
use crate::db::{self, channels::Channel};
use crate::dialogs::Dialog;
use crate::keyboards;
use crate::state::AppState;

const BAD_DATE: &str = "❌ Неверный формат даты. Используйте ГГГГ-ММ-ДД";

fn channel_label(channel: Option<&Channel>) -> String {
    match channel {
        Some(ch) => format!("<a href='{}'>{}</a>", ch.user_link(), escape(&ch.title)),
        None => "Не установлен".to_string(),
    }
}

async fn totals_card(state: &AppState) -> Result<String> {
    let total = db::users::count_total(&state.db).await?;
    let active = db::users::count_active(&state.db).await?;
    let banned = db::users::count_banned(&state.db).await?;
    let channels = db::channels::count(&state.db).await?;
    let main = db::channels::get_main(&state.db).await?;
    let backup = db::channels::get_backup(&state.db).await?;

    Ok(format!(
        "📊 <b>Статистика бота</b>\n\n\
         👤 Всего пользователей: <code>{total}</code>\n\
         🟢 Активных: <code>{active}</code>\n\
         🔴 Заблокированных: <code>{banned}</code>\n\n\
         📢 Каналов: <code>{channels}</code>\n\
         🔷 Основной: {}\n\
         🔶 Резервный: {}",
        channel_label(main.as_ref()),
        channel_label(backup.as_ref())
    ))
}

pub async fn stats_command(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    let card = totals_card(&state).await?;
    bot.send_message(msg.chat.id, card)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::stats_menu())
        .await?;
    Ok(())
}

pub async fn stats_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let card = totals_card(state).await?;
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, card)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::stats_menu())
            .await?;
    }
    ack(bot, q).await
}

// ---------- произвольный период ----------

pub async fn period_prompt(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "📅 <b>Статистика за период</b>\n\nВведите начальную дату в формате ГГГГ-ММ-ДД:",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::back_to_main())
        .await?;
    }
    state.set_dialog(q.from.id, Dialog::StatsPeriodStart);
    ack(bot, q).await
}

/// Начальная дата (диалог `StatsPeriodStart`).
pub async fn on_period_start(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
) -> Result<()> {
    let raw = msg.text().unwrap_or_default().trim();
    let Ok(start) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
        bot.send_message(msg.chat.id, BAD_DATE).await?;
        return Ok(());
    };
    bot.send_message(msg.chat.id, "Введите конечную дату в формате ГГГГ-ММ-ДД:")
        .reply_markup(keyboards::back_to_main())
        .await?;
    state.set_dialog(from.id, Dialog::StatsPeriodEnd { start });
    Ok(())
}

/// Конечная дата (диалог `StatsPeriodEnd`): считает и выводит карточку.
pub async fn on_period_end(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    start: NaiveDate,
) -> Result<()> {
    let raw = msg.text().unwrap_or_default().trim();
    let Ok(end) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
        bot.send_message(msg.chat.id, BAD_DATE).await?;
        return Ok(());
    };

    // Конец включительно: полуинтервал до начала следующего дня.
    let from_ts = start.and_time(NaiveTime::MIN).and_utc();
    let to_ts = (end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    let new_users = db::users::count_joined_period(&state.db, from_ts, to_ts).await?;
    let active = db::users::count_active_period(&state.db, from_ts, to_ts).await?;
    let banned = db::users::count_banned_period(&state.db, from_ts, to_ts).await?;

    bot.send_message(
        msg.chat.id,
        format!(
            "📊 <b>Статистика за период</b>\n\
             📅 {} - {}\n\n\
             👤 Новых пользователей: <code>{new_users}</code>\n\
             🟢 Активных пользователей: <code>{active}</code>\n\
             🔴 Заблокированных: <code>{banned}</code>",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    state.clear_dialog(from.id);
    Ok(())
}

// ---------- последние 7 дней ----------

/// Новые пользователи по дням за неделю до вчерашнего дня включительно.
/// Сегодняшний день не показывается: сутки ещё не закончились.
pub async fn seven_days_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let today = Utc::now().date_naive();
    let mut lines = vec!["📊 <b>Статистика за 7 дней</b>".to_string(), String::new()];
    for back in (1..=7).rev() {
        let day = today - Duration::days(back);
        let from_ts = day.and_time(NaiveTime::MIN).and_utc();
        let to_ts = from_ts + Duration::days(1);
        let joined = db::users::count_joined_period(&state.db, from_ts, to_ts).await?;
        lines.push(format!(
            "📅 {}: <code>{joined}</code> новых",
            day.format("%Y-%m-%d")
        ));
    }

    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, lines.join("\n"))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::stats_menu())
            .await?;
    }
    ack(bot, q).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_label_links_and_escapes() {
        let ch = Channel {
            channel_id: -1001234567890,
            title: "Канал <и К>".to_string(),
            username: None,
            link: Some("https://t.me/+abc".to_string()),
            is_main: true,
            is_backup: false,
        };
        let label = channel_label(Some(&ch));
        assert!(label.contains("https://t.me/+abc"));
        assert!(label.contains("Канал &lt;и К&gt;"));
        assert_eq!(channel_label(None), "Не установлен");
    }

    #[test]
    fn inclusive_period_covers_end_day() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let from_ts = start.and_time(NaiveTime::MIN).and_utc();
        let to_ts = (end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        assert_eq!((to_ts - from_ts).num_hours(), 24);
    }
}
