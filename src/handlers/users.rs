// src/handlers/users.rs
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode, User as TgUser};
use teloxide::utils::html::escape;

use super::{ack, alert, callback_message, toast};
use crate::db::{self, users::User};
use crate::dialogs::{Dialog, SearchMode};
use crate::keyboards;
use crate::state::AppState;
use crate::utils;

fn profile_card(user: &User) -> String {
    let who = match &user.username {
        Some(name) => format!("@{name}"),
        None => utils::mention_link(UserId(user.user_id as u64), &user.full_name),
    };
    format!(
        "👤 Пользователь: {who}\n\
         🆔 ID: <code>{}</code>\n\
         👤 Имя: {}\n\
         🔒 Статус: {}\n\
         Уведомления: {}\n\
         📅 Регистрация: {}",
        user.user_id,
        escape(&user.full_name),
        if user.is_active { "🟢 Активен" } else { "🔴 Заблокирован" },
        if user.should_notify { "🟢 Включены" } else { "🔴 Выключены" },
        user.join_date.format("%d.%m.%Y %H:%M"),
    )
}

/// Карточка пользователя новым сообщением.
async fn send_profile(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    user: &User,
    viewer_level: i32,
    header: Option<&str>,
) -> Result<()> {
    let admin = db::admins::get(&state.db, user.user_id).await?;
    let text = match header {
        Some(h) => format!("{h}\n\n{}", profile_card(user)),
        None => profile_card(user),
    };
    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::profile_menu(user, admin.as_ref(), viewer_level))
        .await?;
    Ok(())
}

/// Карточка на месте текущего экрана (после действий с кнопок).
async fn edit_profile(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user: &User,
    viewer_level: i32,
    header: Option<&str>,
) -> Result<()> {
    let Some((chat, msg_id)) = callback_message(q) else {
        return Ok(());
    };
    let admin = db::admins::get(&state.db, user.user_id).await?;
    let text = match header {
        Some(h) => format!("{h}\n\n{}", profile_card(user)),
        None => profile_card(user),
    };
    bot.edit_message_text(chat, msg_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::profile_menu(user, admin.as_ref(), viewer_level))
        .await?;
    Ok(())
}

/// /ban {id} — выключить уведомления пользователю.
pub async fn ban_command(
    bot: &Bot,
    state: Arc<AppState>,
    msg: &Message,
    arg: Option<&str>,
) -> Result<()> {
    toggle_by_command(bot, &state, msg, arg, false).await
}

/// /unban {id} — включить уведомления пользователю.
pub async fn unban_command(
    bot: &Bot,
    state: Arc<AppState>,
    msg: &Message,
    arg: Option<&str>,
) -> Result<()> {
    toggle_by_command(bot, &state, msg, arg, true).await
}

async fn toggle_by_command(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    arg: Option<&str>,
    enable: bool,
) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let usage = if enable {
        "Используйте команду /unban вместе с ID\n\nПример: /unban 123456"
    } else {
        "Используйте команду /ban вместе с ID\n\nПример: /ban 123456"
    };
    let Some(arg) = arg else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };
    if !arg.chars().all(|c| c.is_ascii_digit()) {
        let _ = bot.delete_message(msg.chat.id, msg.id).await;
        bot.send_message(msg.chat.id, "❌ ID должен содержать только цифры")
            .await?;
        return Ok(());
    }
    let user_id: i64 = arg.parse()?;

    if !db::users::set_notify(&state.db, user_id, enable).await? {
        bot.send_message(msg.chat.id, "❌ Пользователь не найден").await?;
        return Ok(());
    }
    let Some(user) = db::users::get(&state.db, user_id).await? else {
        bot.send_message(msg.chat.id, "❌ Пользователь не найден").await?;
        return Ok(());
    };

    let header = if enable {
        "✅ Уведомления включены ✅"
    } else {
        "❌ Уведомления выключены ❌"
    };
    let level = state.admin_level(from).await?.unwrap_or(0);
    send_profile(bot, state, msg.chat.id, &user, level, Some(header)).await
}

pub async fn users_menu_screen(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    state.clear_dialog(q.from.id);
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "👤 <b>Управление пользователями</b>\n\nВыберите действие:",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::users_menu())
        .await?;
    }
    ack(bot, q).await
}

pub async fn search_menu_screen(bot: &Bot, q: &CallbackQuery) -> Result<()> {
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(
            chat,
            msg_id,
            "👤 <b>Поиск пользователей</b>\n\n\
             Вы можете указать не весь @username/никнейм, бот подберет всех подходящих под запрос пользователей\n\
             Выберите действие:",
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::search_menu())
        .await?;
    }
    ack(bot, q).await
}

pub async fn search_prompt(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    mode: SearchMode,
) -> Result<()> {
    let prompt = match mode {
        SearchMode::Username => "🔍 <b>Поиск по username</b>\n\nВведите часть username (без @):",
        SearchMode::Nickname => {
            "🔍 <b>Поиск по имени/фамилии</b>\n\nВведите часть имени или фамилии:"
        }
        SearchMode::Id => "🔍 <b>Поиск по ID</b>\n\nВведите ID пользователя:",
    };
    if let Some((chat, msg_id)) = callback_message(q) {
        bot.edit_message_text(chat, msg_id, prompt)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::cancel_search())
            .await?;
    }
    state.set_dialog(q.from.id, Dialog::SearchQuery { mode });
    ack(bot, q).await
}

/// Текст поискового запроса (диалог `SearchQuery`).
pub async fn on_search_query(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    mode: SearchMode,
) -> Result<()> {
    let query = msg.text().unwrap_or_default().trim().to_string();
    if query.is_empty() {
        bot.send_message(msg.chat.id, "❌ Запрос не может быть пустым").await?;
        return Ok(());
    }

    let users = match mode {
        SearchMode::Username => {
            db::users::search_by_username(&state.db, &utils::normalize_username(&query), 12).await?
        }
        SearchMode::Nickname => db::users::search_by_nickname(&state.db, &query, 12).await?,
        SearchMode::Id => match query.parse::<i64>() {
            Ok(id) => db::users::get(&state.db, id).await?.into_iter().collect(),
            Err(_) => Vec::new(),
        },
    };

    if users.is_empty() {
        bot.send_message(msg.chat.id, "🔍 Пользователи не найдены").await?;
        state.clear_dialog(from.id);
        return Ok(());
    }

    if users.len() == 1 {
        let level = state.admin_level(from).await?.unwrap_or(0);
        send_profile(bot, state, msg.chat.id, &users[0], level, None).await?;
    } else {
        // В сообщение попадают первые 10, счётчик показывает всё найденное
        let list = users
            .iter()
            .take(10)
            .enumerate()
            .map(|(i, u)| {
                let name = match &u.username {
                    Some(username) => format!("@{username}"),
                    None => "без username".to_string(),
                };
                format!(
                    "{}. {} - {} (ID: <code>{}</code>)",
                    i + 1,
                    name,
                    escape(&u.full_name),
                    u.user_id
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        bot.send_message(
            msg.chat.id,
            format!(
                "🔍 Найдено пользователей: {}\n\n{list}\n\nДля просмотра подробностей отправьте ID пользователя.",
                users.len()
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::back_to_search())
        .await?;
    }
    state.set_dialog(from.id, Dialog::SearchPickId);
    Ok(())
}

/// Ввод ID после списка результатов (диалог `SearchPickId`).
pub async fn on_pick_id(bot: &Bot, state: &AppState, msg: &Message, from: &TgUser) -> Result<()> {
    let text = msg.text().unwrap_or_default().trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        let _ = bot.delete_message(msg.chat.id, msg.id).await;
        bot.send_message(msg.chat.id, "❌ Укажите верный id").await?;
        return Ok(());
    }
    let user_id: i64 = text.parse()?;
    let Some(user) = db::users::get(&state.db, user_id).await? else {
        bot.send_message(msg.chat.id, "❌ Пользователь не найден").await?;
        return Ok(());
    };
    let level = state.admin_level(from).await?.unwrap_or(0);
    send_profile(bot, state, msg.chat.id, &user, level, None).await
}

pub async fn users_list_stub(bot: &Bot, q: &CallbackQuery) -> Result<()> {
    toast(bot, q, "❌ Пока в разработке ❌").await
}

/// Кнопки «уведомлять / не уведомлять» в карточке.
pub async fn toggle_notify(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    user_id: i64,
    enable: bool,
) -> Result<()> {
    if !db::users::set_notify(&state.db, user_id, enable).await? {
        let text = if enable {
            "❌ Ошибка разблокировки уведомлений"
        } else {
            "❌ Ошибка блокировки уведомлений"
        };
        return alert(bot, q, text).await;
    }
    let Some(user) = db::users::get(&state.db, user_id).await? else {
        return alert(bot, q, "❌ Пользователь не найден").await;
    };
    let header = if enable {
        "✅ Уведомления включены ✅"
    } else {
        "❌ Уведомления выключены ❌"
    };
    edit_profile(bot, state, q, &user, level, Some(header)).await?;
    ack(bot, q).await
}

pub async fn grant_admin(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    user_id: i64,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    let Some(user) = db::users::get(&state.db, user_id).await? else {
        return alert(bot, q, "❌ Пользователь не найден").await;
    };
    let added = db::admins::add(
        &state.db,
        user.user_id,
        user.username.as_deref(),
        &user.full_name,
        1,
    )
    .await?;
    if !added {
        return alert(bot, q, "❌ Ошибка назначения админа").await;
    }
    toast(bot, q, "✅ Пользователь назначен администратором!").await?;
    edit_profile(bot, state, q, &user, level, None).await
}

pub async fn revoke_admin(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    user_id: i64,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    if !db::admins::remove(&state.db, user_id).await? {
        return alert(bot, q, "❌ Ошибка отзыва прав").await;
    }
    toast(bot, q, "✅ Админские права отозваны!").await?;
    if let Some(user) = db::users::get(&state.db, user_id).await? {
        edit_profile(bot, state, q, &user, level, None).await?;
    }
    Ok(())
}

pub async fn set_admin_level(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    user_id: i64,
    new_level: i32,
) -> Result<()> {
    if level < 2 {
        return alert(bot, q, "❌ Недостаточно прав!").await;
    }
    if !db::admins::set_level(&state.db, user_id, new_level).await? {
        return alert(bot, q, "❌ Ошибка изменения уровня").await;
    }
    toast(bot, q, &format!("✅ Уровень админа установлен: {new_level}")).await?;
    if let Some(user) = db::users::get(&state.db, user_id).await? {
        edit_profile(bot, state, q, &user, level, None).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user(username: Option<&str>) -> User {
        User {
            user_id: 99,
            username: username.map(str::to_string),
            full_name: "Тест <Юзер>".to_string(),
            is_active: true,
            is_banned: false,
            captcha_passed: true,
            should_notify: false,
            join_date: Utc::now(),
            banned_when: None,
        }
    }

    #[test]
    fn card_prefers_username() {
        let card = profile_card(&sample_user(Some("tester")));
        assert!(card.contains("@tester"));
        assert!(card.contains("<code>99</code>"));
        assert!(card.contains("🔴 Выключены"));
        // имя экранируется
        assert!(card.contains("Тест &lt;Юзер&gt;"));
    }

    #[test]
    fn card_falls_back_to_mention_link() {
        let card = profile_card(&sample_user(None));
        assert!(card.contains("tg://user?id=99"));
    }
}
