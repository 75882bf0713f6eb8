// src/handlers/user.rs
use anyhow::Result;
use log::{debug, error};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, Message, ParseMode, User as TgUser};
use teloxide::utils::html::escape;

use crate::db;
use crate::keyboards;
use crate::notifier;
use crate::state::AppState;
use crate::templates;
use crate::{captcha, dialogs::TemplateTarget};

/// /start: регистрируем пользователя; непрошедшим — капча,
/// прошедшим — приветствие со ссылкой (после проверки подписки).
pub async fn start(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let user = db::users::get_or_create(
        &state.db,
        from.id.0 as i64,
        from.username.as_deref(),
        &from.full_name(),
    )
    .await?;

    if user.captcha_passed {
        greet(bot, &state, msg.chat.id, from).await?;
        return Ok(());
    }
    captcha::send_captcha(bot, &state, msg.chat.id, from.id.0 as i64).await
}

/// /channel: актуальная ссылка на основной канал. Непрошедшим капчу
/// выдаётся капча, неподписанным — приглашение подписаться.
pub async fn channel(bot: &Bot, state: Arc<AppState>, msg: &Message) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let user = db::users::get_or_create(
        &state.db,
        from.id.0 as i64,
        from.username.as_deref(),
        &from.full_name(),
    )
    .await?;

    if !user.captcha_passed {
        return captcha::send_captcha(bot, &state, msg.chat.id, from.id.0 as i64).await;
    }
    if !is_subscribed(bot, &state, from.id).await? {
        return send_subscription_prompt(bot, &state, msg.chat.id).await;
    }

    match db::channels::get_main(&state.db).await? {
        Some(main) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Актуальная ссылка на канал: 👇\n<b><a href='{}'>{}</a></b>",
                    main.user_link(),
                    escape(&main.title)
                ),
            )
            .parse_mode(ParseMode::Html)
            .link_preview_options(notifier::no_preview())
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "⚠ Основной канал ещё не настроен. Попробуйте позже.")
                .await?;
        }
    }
    Ok(())
}

/// Выдача ссылки после пройденной капчи: сначала подписка на резервный
/// канал, затем приветственный шаблон с данными основного канала.
pub async fn greet(bot: &Bot, state: &AppState, chat_id: ChatId, from: &TgUser) -> Result<()> {
    if !is_subscribed(bot, state, from.id).await? {
        return send_subscription_prompt(bot, state, chat_id).await;
    }

    let Some(main) = db::channels::get_main(&state.db).await? else {
        bot.send_message(chat_id, "⚠ Основной канал ещё не настроен. Попробуйте позже.")
            .await?;
        return Ok(());
    };

    let template = state.welcome.get();
    let text = template.fill(&main.user_link(), &main.title);
    templates::send_template(bot, chat_id, &template, &text, "welcome").await?;
    Ok(())
}

/// Подписан ли пользователь на резервный канал.
/// Пока резервный канал не настроен, проверка считается пройденной.
pub async fn is_subscribed(bot: &Bot, state: &AppState, user_id: UserId) -> Result<bool> {
    let Some(backup) = db::channels::get_backup(&state.db).await? else {
        return Ok(true);
    };
    match bot.get_chat_member(ChatId(backup.channel_id), user_id).await {
        Ok(member) => Ok(matches!(
            member.kind,
            ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) | ChatMemberKind::Member(_)
        )),
        Err(e) => {
            debug!("не удалось проверить подписку (user={}): {e}", user_id.0);
            Ok(false)
        }
    }
}

async fn send_subscription_prompt(bot: &Bot, state: &AppState, chat_id: ChatId) -> Result<()> {
    match db::channels::get_backup(&state.db).await? {
        Some(backup) => {
            let target = match &backup.username {
                Some(name) => format!("@{name}"),
                None => {
                    let raw = backup.channel_id.to_string();
                    let internal = raw.strip_prefix("-100").unwrap_or(&raw).to_string();
                    format!("Ссылка: https://t.me/c/{internal}")
                }
            };
            bot.send_message(
                chat_id,
                format!("⚠ Для использования бота необходимо подписаться на резервный канал:\n{target}"),
            )
            .await?;
        }
        None => {
            bot.send_message(chat_id, "⚠ Резервный канал не настроен. Обратитесь к администратору.")
                .await?;
        }
    }
    Ok(())
}

/// Текст от прошедшего капчу пользователя уходит в чат поддержки:
/// пишем в историю и показываем карточку всем админам.
pub async fn forward_support(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    text: &str,
) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        bot.send_message(msg.chat.id, "❌ Сообщение не может быть пустым")
            .await?;
        return Ok(());
    }

    let user_id = from.id.0 as i64;
    if let Err(e) = db::chat::add_user_message(&state.db, user_id, text).await {
        error!("не удалось сохранить сообщение пользователя {user_id}: {e}");
        bot.send_message(msg.chat.id, "❌ Не удалось отправить сообщение, попробуйте позже")
            .await?;
        return Ok(());
    }

    let card = format!(
        "📩 <b>Новое сообщение от пользователя</b>\n\nИмя: {}\nID: <code>{}</code>\n\n<code>{}</code>",
        escape(&from.full_name()),
        user_id,
        escape(text)
    );
    for admin in db::admins::all(&state.db).await? {
        if admin.user_id == user_id {
            continue;
        }
        let sent = bot
            .send_message(ChatId(admin.user_id), card.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::chat_notification(user_id))
            .await;
        if let Err(e) = sent {
            debug!("уведомление админу {} не доставлено: {e}", admin.user_id);
        }
    }

    bot.send_message(msg.chat.id, "✅ Сообщение отправлено администрации")
        .await?;
    Ok(())
}

/// Шаблон приветствия: клик по текстовой кнопке возвращает её содержимое.
pub async fn on_template_text_button(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
    button_id: &str,
) -> Result<()> {
    let template = state.template_store(target).get();
    let Some(button) = template.button_by_id(button_id) else {
        bot.answer_callback_query(q.id.clone())
            .text("❌ Кнопка не найдена")
            .show_alert(true)
            .await?;
        return Ok(());
    };
    if let Some(message) = &q.message {
        bot.send_message(message.chat().id, button.value.clone())
            .await?;
    }
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}
