//! Массовые отправки: уведомление о смене канала и быстрые рассылки.
//! Получатели — активные, не заблокированные, прошедшие капчу пользователи
//! с включёнными уведомлениями.

use anyhow::Result;
use log::{error, info};
use sqlx::PgPool;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, LinkPreviewOptions, ParseMode,
};

use crate::db::{self, channels::Channel};
use crate::templates::{self, ButtonKind, MessageTemplate, TemplateButton};

/// Итог массовой отправки.
#[derive(Debug, Clone, Copy)]
pub struct FanoutReport {
    pub success: i32,
    pub failures: i32,
    pub total: i32,
}

/// Telegram иначе разворачивает ссылку на канал в карточку,
/// и уведомление превращается в баннер.
pub fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Рассылает шаблон уведомления всем получателям, подставив данные канала.
/// Тем, кому доставить не удалось, уведомления выключаются.
pub async fn send_notification_to_all(
    bot: &Bot,
    pool: &PgPool,
    template: &MessageTemplate,
    channel: &Channel,
) -> Result<FanoutReport> {
    let users = db::users::recipients(pool).await?;
    let total = users.len() as i32;
    let text = template.fill(&channel.user_link(), &channel.title);

    let mut success = 0;
    let mut failures = 0;
    for user in users {
        let chat = ChatId(user.user_id);
        let sent = if template.media_type.is_some() {
            templates::send_template(bot, chat, template, &text, "notif")
                .await
                .map(|_| ())
        } else {
            send_text(
                bot,
                chat,
                &text,
                templates::keyboard_for_buttons(&template.buttons, "notif"),
            )
            .await
        };
        match sent {
            Ok(()) => success += 1,
            Err(e) => {
                error!("не удалось уведомить пользователя {}: {e}", user.user_id);
                failures += 1;
                db::users::set_notify(pool, user.user_id, false).await?;
            }
        }
    }

    info!("уведомление разослано: успешно {success}, ошибок {failures}, всего {total}");
    Ok(FanoutReport {
        success,
        failures,
        total,
    })
}

/// Уведомляет пользователей о новом основном канале по сохранённому шаблону.
pub async fn notify_channel_change(
    bot: &Bot,
    pool: &PgPool,
    template: &MessageTemplate,
    new_main: &Channel,
) -> Result<FanoutReport> {
    info!(
        "смена основного канала на «{}» ({}), рассылаем уведомление",
        new_main.title, new_main.channel_id
    );
    send_notification_to_all(bot, pool, template, new_main).await
}

/// Клавиатура рассылки: текстовые кнопки несут id рассылки,
/// чтобы по нажатию достать содержимое из истории.
pub fn broadcast_keyboard(
    broadcast_id: i32,
    buttons: &[TemplateButton],
) -> Option<InlineKeyboardMarkup> {
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
                format!("broadcast_textbtn:{broadcast_id}:{}", b.id),
            )]),
        })
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}

/// Рассылает сообщение всем получателям. Кому доставить не удалось —
/// выключаем уведомления и помечаем заблокировавшим бота.
pub async fn send_broadcast_to_all(
    bot: &Bot,
    pool: &PgPool,
    broadcast_id: i32,
    text: &str,
    media_type: &str,
    media_id: Option<&str>,
    buttons: &[TemplateButton],
) -> Result<FanoutReport> {
    let users = db::users::recipients(pool).await?;
    let total = users.len() as i32;
    let keyboard = broadcast_keyboard(broadcast_id, buttons);

    let mut success = 0;
    let mut failures = 0;
    for user in users {
        let chat = ChatId(user.user_id);
        match send_broadcast_message(bot, chat, text, media_type, media_id, keyboard.clone()).await
        {
            Ok(()) => success += 1,
            Err(e) => {
                error!("ошибка отправки пользователю {}: {e}", user.user_id);
                failures += 1;
                db::users::set_notify(pool, user.user_id, false).await?;
                db::users::ban(pool, user.user_id).await?;
            }
        }
    }

    info!(
        "рассылка #{broadcast_id} завершена: успешно {success}, ошибок {failures}, всего {total}"
    );
    Ok(FanoutReport {
        success,
        failures,
        total,
    })
}

/// Отправка одного сообщения рассылки выбранного типа. Текст уходит как есть,
/// без HTML-разметки: пользователь видит ровно то, что набрал админ.
pub async fn send_broadcast_message(
    bot: &Bot,
    chat: ChatId,
    text: &str,
    media_type: &str,
    media_id: Option<&str>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let stored =
        |id: &str| teloxide::types::InputFile::file_id(teloxide::types::FileId(id.to_string()));
    match (media_type, media_id) {
        ("photo", Some(id)) => {
            let mut req = bot.send_photo(chat, stored(id)).caption(text.to_string());
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?;
        }
        ("video", Some(id)) => {
            let mut req = bot.send_video(chat, stored(id)).caption(text.to_string());
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?;
        }
        ("document", Some(id)) => {
            let mut req = bot
                .send_document(chat, stored(id))
                .caption(text.to_string());
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?;
        }
        _ => {
            let mut req = bot
                .send_message(chat, text.to_string())
                .link_preview_options(no_preview());
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?;
        }
    }
    Ok(())
}

async fn send_text(
    bot: &Bot,
    chat: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let mut req = bot
        .send_message(chat, text.to_string())
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_preview());
    if let Some(kb) = keyboard {
        req = req.reply_markup(kb);
    }
    req.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateButton;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn broadcast_keyboard_embeds_broadcast_id() {
        let buttons = vec![
            TemplateButton::new("Сайт", ButtonKind::Url, "https://example.com"),
            TemplateButton::new("Инфо", ButtonKind::Text, "подробности"),
        ];
        let kb = broadcast_keyboard(42, &buttons).unwrap();
        assert_eq!(kb.inline_keyboard.len(), 2);

        match &kb.inline_keyboard[1][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => {
                assert!(data.starts_with("broadcast_textbtn:42:"));
            }
            other => panic!("ожидался callback, получено {other:?}"),
        }
    }

    #[test]
    fn broadcast_keyboard_skips_bad_urls() {
        let buttons = vec![TemplateButton::new("Сломан", ButtonKind::Url, "не ссылка")];
        assert!(broadcast_keyboard(1, &buttons).is_none());
        assert!(broadcast_keyboard(1, &[]).is_none());
    }

    #[test]
    fn preview_options_disable_everything() {
        let opts = no_preview();
        assert!(opts.is_disabled);
        assert!(opts.url.is_none());
    }
}
