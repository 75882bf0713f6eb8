//! Фото-капча на входе. Задание живёт в БД и переживает рестарты:
//! - send_captcha(bot, state, chat_id, user_id) — выдать задание
//! - on_answer(bot, state, &msg) — проверить текстовый ответ
//! - on_refresh(bot, state, &q) — кнопка «Обновить капчу»
//!
//! Неверный ответ заменяет картинку на месте (редактирование фото),
//! попытки ограничены `CAPTCHA_MAX_ATTEMPTS`.

pub mod image;

use anyhow::Result;
use log::{debug, warn};
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, MessageId};

use crate::db;
use crate::keyboards;
use crate::state::AppState;

/// Итог обработки текста: вызывающая сторона решает, что делать дальше.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Задания нет — сообщение не было ответом на капчу.
    NoChallenge,
    /// Ответ верный, пользователь пропущен дальше.
    Passed,
    /// Неверно, выдана новая картинка.
    Retry,
    /// Попытки исчерпаны, пользователь заблокирован.
    Banned,
    /// Ввод проигнорирован (слишком длинный).
    Ignored,
}

pub async fn send_captcha(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
) -> Result<()> {
    send_challenge(
        bot,
        state,
        chat_id,
        user_id,
        0,
        "🔐 Для доступа к боту решите капчу. Введите текст с изображения:",
    )
    .await?;
    debug!("CAPTCHA issued (chat={}, user={})", chat_id.0, user_id);
    Ok(())
}

pub async fn on_answer(bot: &Bot, state: &AppState, msg: &Message) -> Result<Outcome> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(Outcome::NoChallenge);
    };
    let Some(text) = msg.text() else {
        return Ok(Outcome::NoChallenge);
    };
    let user_id = from.id.0 as i64;
    let chat_id = msg.chat.id;

    let Some(challenge) = db::captcha::get(&state.db, user_id).await? else {
        return Ok(Outcome::NoChallenge);
    };

    // Ответ не должен оставаться в чате
    let _ = bot.delete_message(chat_id, msg.id).await;

    if text.chars().count() > image::MAX_ANSWER_LEN {
        return Ok(Outcome::Ignored);
    }

    let attempts = db::captcha::bump_attempts(&state.db, user_id).await?;

    if image::normalize(text) == image::normalize(&challenge.text) {
        db::captcha::delete(&state.db, user_id).await?;
        db::users::mark_captcha_passed(&state.db, user_id).await?;
        bot.send_message(chat_id, "✅ Капча успешно пройдена!").await?;
        debug!("CAPTCHA solved (user={user_id})");
        return Ok(Outcome::Passed);
    }

    let remaining = state.cfg.captcha_max_attempts - attempts;
    if remaining <= 0 {
        db::captcha::delete(&state.db, user_id).await?;
        db::users::ban(&state.db, user_id).await?;
        bot.send_message(chat_id, "❌ Превышено количество попыток. Вы заблокированы.")
            .await?;
        warn!("CAPTCHA attempts exhausted, user banned (user={user_id})");
        return Ok(Outcome::Banned);
    }

    let caption = format!(
        "❌ Неверно! Осталось попыток: {remaining}\n\n🔐 Пожалуйста, попробуйте еще раз. Введите текст с изображения:"
    );
    match challenge.message_id {
        // Обновляем то же сообщение, чтобы не плодить фото в чате
        Some(mid) => {
            replace_challenge(bot, state, chat_id, MessageId(mid), user_id, attempts, &caption)
                .await?;
        }
        None => {
            send_challenge(bot, state, chat_id, user_id, attempts, &caption).await?;
        }
    }
    Ok(Outcome::Retry)
}

pub async fn on_refresh(bot: &Bot, state: &AppState, q: &CallbackQuery) -> Result<()> {
    let user_id = q.from.id.0 as i64;

    let Some(challenge) = db::captcha::get(&state.db, user_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text("Капча не найдена. Пожалуйста, запросите новую.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    if let Some(m) = &q.message {
        replace_challenge(
            bot,
            state,
            m.chat().id,
            m.id(),
            user_id,
            challenge.attempts,
            "🔄 Капча обновлена. Введите текст с изображения:",
        )
        .await?;
    }
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

/// Новое задание новым сообщением (первая выдача либо потерянное фото).
async fn send_challenge(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    attempts: i32,
    caption: &str,
) -> Result<()> {
    let code = image::gen_code();
    db::captcha::upsert(&state.db, user_id, &code, attempts).await?;

    let png = image::render_captcha_png(&code)?;
    let msg = bot
        .send_photo(chat_id, InputFile::memory(png).file_name("captcha.png"))
        .caption(caption)
        .reply_markup(keyboards::captcha_refresh())
        .await?;
    db::captcha::set_message_id(&state.db, user_id, msg.id.0).await?;
    Ok(())
}

/// Новое задание на месте старого фото.
async fn replace_challenge(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    message_id: MessageId,
    user_id: i64,
    attempts: i32,
    caption: &str,
) -> Result<()> {
    let code = image::gen_code();
    db::captcha::upsert(&state.db, user_id, &code, attempts).await?;

    let png = image::render_captcha_png(&code)?;
    let media = InputMedia::Photo(
        InputMediaPhoto::new(InputFile::memory(png).file_name("captcha.png"))
            .caption(caption.to_string()),
    );
    bot.edit_message_media(chat_id, message_id, media)
        .reply_markup(keyboards::captcha_refresh())
        .await?;
    db::captcha::set_message_id(&state.db, user_id, message_id.0).await?;
    Ok(())
}
