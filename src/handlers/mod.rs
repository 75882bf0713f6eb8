//! Маршрутизация апдейтов. Сообщения идут по воронке: команды,
//! шаг активного диалога админа, капча, пересылка в поддержку.
//! Callback-грамматика описана в `keyboards`; здесь общедоступные
//! маршруты обрабатываются до проверки уровня админа.

pub mod broadcast;
pub mod channels;
pub mod chat;
pub mod menu;
pub mod stats;
pub mod template_editor;
pub mod user;
pub mod users;

use anyhow::Result;
use log::debug;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberUpdated, Message, MessageId, User as TgUser};

use crate::captcha::{self, Outcome};
use crate::commands;
use crate::db;
use crate::dialogs::{Dialog, SearchMode, TemplateTarget};
use crate::state::AppState;
use crate::templates::ButtonKind;

pub(crate) fn callback_message(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|m| (m.chat().id, m.id()))
}

pub(crate) async fn ack(bot: &Bot, q: &CallbackQuery) -> Result<()> {
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

pub(crate) async fn alert(bot: &Bot, q: &CallbackQuery, text: &str) -> Result<()> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await?;
    Ok(())
}

pub(crate) async fn toast(bot: &Bot, q: &CallbackQuery, text: &str) -> Result<()> {
    bot.answer_callback_query(q.id.clone()).text(text).await?;
    Ok(())
}

/// Сбрасывает диалог админа. Подвисший предпросмотр убирается из чата.
pub(crate) async fn cleanup_dialog(bot: &Bot, state: &AppState, admin: UserId) {
    if let Some(Dialog::TemplatePreview { chat, msg }) = state.take_dialog(admin) {
        let _ = bot.delete_message(chat, msg).await;
    }
}

pub async fn on_message(bot: Bot, state: Arc<AppState>, msg: Message) -> Result<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(from) = msg.from.clone() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }

    // 1) команды
    if let Some(text) = msg.text() {
        if text.starts_with('/') && commands::handle_command(&bot, state.clone(), &msg, text).await?
        {
            return Ok(());
        }
    }

    // 2) шаг активного диалога админа
    if let Some(dialog) = state.dialog(from.id) {
        return dialog_step(&bot, &state, &msg, &from, dialog).await;
    }

    // 3) капча
    match captcha::on_answer(&bot, &state, &msg).await? {
        Outcome::Passed => return user::greet(&bot, &state, msg.chat.id, &from).await,
        Outcome::Retry | Outcome::Banned | Outcome::Ignored => return Ok(()),
        Outcome::NoChallenge => {}
    }

    // 4) поддержка: прошедший капчу пользователь пишет админам.
    // Не-текст приходит пустой строкой и получает отказ в forward_support.
    let text = msg.text().unwrap_or_default();
    if text.starts_with('/') {
        return Ok(());
    }
    if state.admin_level(&from).await?.unwrap_or(0) > 0 {
        debug!("текст админа вне диалога игнорируется (user={})", from.id);
        return Ok(());
    }
    let Some(user) = db::users::get(&state.db, from.id.0 as i64).await? else {
        return Ok(());
    };
    if user.captcha_passed {
        return user::forward_support(&bot, &state, &msg, &from, text).await;
    }
    Ok(())
}

async fn dialog_step(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
    from: &TgUser,
    dialog: Dialog,
) -> Result<()> {
    match dialog {
        Dialog::BroadcastContent => broadcast::on_content(bot, state, msg, from).await,
        Dialog::BroadcastButtonLabel { draft, kind } => {
            broadcast::on_button_label(bot, state, msg, from, draft, kind).await
        }
        Dialog::BroadcastButtonValue { draft, kind, label } => {
            broadcast::on_button_value(bot, state, msg, from, draft, kind, label).await
        }
        Dialog::TemplateText { target } => {
            template_editor::on_template_text(bot, state, msg, from, target).await
        }
        Dialog::TemplateMedia { target } => {
            template_editor::on_template_media(bot, state, msg, from, target).await
        }
        Dialog::TemplateButtonLabel { target, kind } => {
            template_editor::on_button_label(bot, state, msg, from, target, kind).await
        }
        Dialog::TemplateButtonValue { target, kind, label } => {
            template_editor::on_button_value(bot, state, msg, from, target, kind, label).await
        }
        Dialog::SearchQuery { mode } => users::on_search_query(bot, state, msg, from, mode).await,
        Dialog::SearchPickId => users::on_pick_id(bot, state, msg, from).await,
        Dialog::SupportReply { user_id } => chat::on_reply(bot, state, msg, from, user_id).await,
        Dialog::StatsPeriodStart => stats::on_period_start(bot, state, msg, from).await,
        Dialog::StatsPeriodEnd { start } => {
            stats::on_period_end(bot, state, msg, from, start).await
        }
        Dialog::ChannelLink {
            channel_id,
            prompt_chat,
            prompt_msg,
        } => {
            channels::on_channel_link(bot, state, msg, from.id, channel_id, prompt_chat, prompt_msg)
                .await
        }
        // Эти состояния ждут callback, а не текст.
        Dialog::BroadcastReady { .. } | Dialog::TemplatePreview { .. } => {
            debug!("сообщение в callback-состоянии игнорируется (user={})", from.id);
            Ok(())
        }
    }
}

pub async fn on_callback(bot: Bot, state: Arc<AppState>, q: CallbackQuery) -> Result<()> {
    let Some(data) = q.data.clone() else {
        return ack(&bot, &q).await;
    };
    let data = data.as_str();

    // --- общедоступные маршруты ---
    match data {
        "refresh_captcha" => return captcha::on_refresh(&bot, &state, &q).await,
        "no_action" | "current_page" => return ack(&bot, &q).await,
        "delete_this_message" => {
            if let Some((chat, msg_id)) = callback_message(&q) {
                let _ = bot.delete_message(chat, msg_id).await;
            }
            return ack(&bot, &q).await;
        }
        _ => {}
    }
    if let Some(id) = data.strip_prefix("welcome_textbtn:") {
        return user::on_template_text_button(&bot, &state, &q, TemplateTarget::Welcome, id).await;
    }
    if let Some(id) = data.strip_prefix("notif_textbtn:") {
        return user::on_template_text_button(&bot, &state, &q, TemplateTarget::Notification, id)
            .await;
    }
    if let Some(payload) = data.strip_prefix("broadcast_textbtn:") {
        return broadcast::on_broadcast_text_button(&bot, &state, &q, payload).await;
    }
    if let Some(id) = data.strip_prefix("preview_btn:") {
        return broadcast::on_preview_button(&bot, &state, &q, id).await;
    }

    // --- дальше только админы ---
    let level = state.admin_level(&q.from).await?.unwrap_or(0);
    if level < 1 {
        return alert(&bot, &q, "❌ Недостаточно прав!").await;
    }

    match data {
        "admin_main" => menu::main_menu_screen(&bot, &state, &q, level).await,

        "admin_stats" => stats::stats_screen(&bot, &state, &q).await,
        "admin_stats_period" => stats::period_prompt(&bot, &state, &q).await,
        "admin_stats_7days" => stats::seven_days_screen(&bot, &state, &q).await,

        "admin_users" => users::users_menu_screen(&bot, &state, &q).await,
        "admin_search_user" | "admin_search_menu" => users::search_menu_screen(&bot, &q).await,
        "admin_search_username" => {
            users::search_prompt(&bot, &state, &q, SearchMode::Username).await
        }
        "admin_search_nickname" => {
            users::search_prompt(&bot, &state, &q, SearchMode::Nickname).await
        }
        "admin_search_id" => users::search_prompt(&bot, &state, &q, SearchMode::Id).await,
        "admin_users_list" => users::users_list_stub(&bot, &q).await,

        "admin_channels" => channels::channels_menu_screen(&bot, &state, &q, level).await,
        "admin_change_main" => channels::start_pick(&bot, &state, &q, level, false).await,
        "admin_change_backup" => channels::start_pick(&bot, &state, &q, level, true).await,

        "admin_messages" => chat::menu_screen(&bot, &state, &q).await,
        "admin_messages_unread" => chat::unread_screen(&bot, &state, &q).await,
        "admin_messages_recent" => chat::recent_screen(&bot, &state, &q).await,

        "admin_notif" => {
            template_editor::menu_screen(&bot, &state, &q, TemplateTarget::Notification).await
        }
        "admin_welcome" => {
            template_editor::menu_screen(&bot, &state, &q, TemplateTarget::Welcome).await
        }
        "notif_send" => template_editor::send_confirm_screen(&bot, &q).await,
        "confirm_send" => template_editor::confirm_send(&bot, &state, &q).await,

        "admin_broadcast" => broadcast::menu_screen(&bot, &state, &q).await,
        "broadcast_quick" => broadcast::quick_start(&bot, &state, &q).await,
        "broadcast_manage_buttons" => broadcast::offer_buttons_screen(&bot, &state, &q).await,
        "broadcast_add_button" | "broadcast_add_another" => {
            broadcast::add_button_screen(&bot, &state, &q).await
        }
        "broadcast_type_url" => {
            broadcast::pick_button_kind(&bot, &state, &q, ButtonKind::Url).await
        }
        "broadcast_type_text" => {
            broadcast::pick_button_kind(&bot, &state, &q, ButtonKind::Text).await
        }
        "broadcast_finish_buttons" => broadcast::finish_buttons(&bot, &state, &q).await,
        "broadcast_confirm" => broadcast::confirm(&bot, &state, &q).await,
        "broadcast_history" => broadcast::history_screen(&bot, &state, &q).await,

        "admin_logs" => menu::logs_screen(&bot, &state, &q, level).await,
        "admin_backup" => menu::backup_screen(&bot, &state, &q, level).await,

        _ => admin_payload_route(&bot, &state, &q, level, data).await,
    }
}

/// Callback'и с параметром в данных.
async fn admin_payload_route(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    level: i32,
    data: &str,
) -> Result<()> {
    // профиль пользователя
    if let Some(id) = parse_suffix::<i64>(data, "admin_ban_") {
        return users::toggle_notify(bot, state, q, level, id, false).await;
    }
    if let Some(id) = parse_suffix::<i64>(data, "admin_unban_") {
        return users::toggle_notify(bot, state, q, level, id, true).await;
    }
    if let Some(id) = parse_suffix::<i64>(data, "admin_grant_") {
        return users::grant_admin(bot, state, q, level, id).await;
    }
    if let Some(id) = parse_suffix::<i64>(data, "admin_revoke_") {
        return users::revoke_admin(bot, state, q, level, id).await;
    }
    if let Some(rest) = data.strip_prefix("admin_setlevel_") {
        if let Some((id, new_level)) = rest.rsplit_once('_') {
            if let (Ok(id), Ok(new_level)) = (id.parse::<i64>(), new_level.parse::<i32>()) {
                return users::set_admin_level(bot, state, q, level, id, new_level).await;
            }
        }
    }

    // выбор канала и пагинация
    if let Some(id) = parse_suffix::<i64>(data, "select_main_") {
        return channels::select_channel(bot, state, q, level, false, id).await;
    }
    if let Some(id) = parse_suffix::<i64>(data, "select_backup_") {
        return channels::select_channel(bot, state, q, level, true, id).await;
    }
    if let Some(page) = parse_suffix::<usize>(data, "main_page_") {
        return channels::paginate_pick(bot, state, q, level, false, page).await;
    }
    if let Some(page) = parse_suffix::<usize>(data, "backup_page_") {
        return channels::paginate_pick(bot, state, q, level, true, page).await;
    }
    if let Some(id) = parse_suffix::<i64>(data, "admin_link_channel_") {
        return channels::link_prompt(bot, state, q, level, id).await;
    }

    // диалоги поддержки
    if let Some(rest) = data.strip_prefix("admin_messages_open_") {
        return match rest.parse::<i64>() {
            Ok(id) => chat::open_dialog(bot, state, q, id).await,
            Err(_) => alert(bot, q, "❌ Некорректный идентификатор").await,
        };
    }
    if let Some(rest) = data.strip_prefix("admin_messages_reply_") {
        return match rest.parse::<i64>() {
            Ok(id) => chat::start_reply(bot, state, q, id).await,
            Err(_) => alert(bot, q, "❌ Некорректный идентификатор").await,
        };
    }

    // история рассылок
    if let Some(id) = parse_suffix::<i32>(data, "broadcast_details:") {
        return broadcast::details_screen(bot, state, q, id).await;
    }
    if let Some(id) = parse_suffix::<i32>(data, "broadcast_repeat:") {
        return broadcast::repeat(bot, state, q, id).await;
    }
    if let Some(id) = parse_suffix::<i32>(data, "broadcast_send:") {
        return broadcast::send_to_me(bot, state, q, id).await;
    }

    // редакторы шаблонов
    for target in [TemplateTarget::Welcome, TemplateTarget::Notification] {
        let prefixed = data
            .strip_prefix(target.prefix())
            .and_then(|rest| rest.strip_prefix('_'));
        if let Some(action) = prefixed {
            return template_action(bot, state, q, target, action).await;
        }
    }

    // логи
    if let Some(name) = data.strip_prefix("logs-") {
        return menu::send_log(bot, state, q, level, name).await;
    }

    debug!("необработанный callback: {data}");
    ack(bot, q).await
}

async fn template_action(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    target: TemplateTarget,
    action: &str,
) -> Result<()> {
    match action {
        "edit_text" => template_editor::edit_text_screen(bot, state, q, target).await,
        "edit_media" => template_editor::edit_media_screen(bot, state, q, target).await,
        "remove_media" => template_editor::remove_media(bot, state, q, target).await,
        "manage_buttons" => template_editor::manage_buttons_screen(bot, state, q, target).await,
        "add_button" => template_editor::add_button_screen(bot, state, q, target).await,
        "type_url" => template_editor::pick_button_kind(bot, state, q, target, ButtonKind::Url).await,
        "type_text" => {
            template_editor::pick_button_kind(bot, state, q, target, ButtonKind::Text).await
        }
        "remove_button" => template_editor::remove_button_screen(bot, state, q, target).await,
        "clear_buttons" => template_editor::clear_buttons(bot, state, q, target).await,
        "preview" => template_editor::preview(bot, state, q, target).await,
        _ => {
            if let Some(index) = parse_suffix::<usize>(action, "removebtn_") {
                return template_editor::remove_button(bot, state, q, target, index).await;
            }
            debug!("необработанное действие редактора: {action}");
            ack(bot, q).await
        }
    }
}

fn parse_suffix<T: std::str::FromStr>(data: &str, prefix: &str) -> Option<T> {
    data.strip_prefix(prefix)?.parse().ok()
}

pub async fn on_chat_member_update(
    bot: Bot,
    state: Arc<AppState>,
    upd: ChatMemberUpdated,
) -> Result<()> {
    let became_present = upd.new_chat_member.is_present();
    let was_absent = !upd.old_chat_member.is_present();

    if became_present && was_absent {
        return channels::on_bot_added(&bot, &state, &upd).await;
    }
    if !became_present && !was_absent {
        return channels::on_bot_removed(&bot, &state, &upd).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_suffix_extracts_typed_payload() {
        assert_eq!(parse_suffix::<i64>("admin_ban_123", "admin_ban_"), Some(123));
        assert_eq!(parse_suffix::<i32>("broadcast_details:7", "broadcast_details:"), Some(7));
        assert_eq!(parse_suffix::<i64>("admin_ban_abc", "admin_ban_"), None);
        assert_eq!(parse_suffix::<i64>("other_999", "admin_ban_"), None);
    }
}
