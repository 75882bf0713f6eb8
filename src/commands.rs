use crate::db;
use crate::handlers;
use crate::state::AppState;
use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, Message, Recipient};

/// Минимальный уровень доступа для команды. `None` — команда боту не известна
/// и сообщение уходит дальше по конвейеру (капча / поддержка).
///
/// 0 — любой пользователь, 1 — админ, 2 — супер-админ, 3 — разработчик.
pub fn required_level(cmd: &str) -> Option<i32> {
    let level = match cmd {
        "start" | "channel" => 0,
        "stats" | "admin" | "broadcast" => 1,
        "ban" | "unban" | "edit_channels" | "edit_notification" | "edit_welcome" => 2,
        "logs" | "backup" => 3,
        _ => return None,
    };
    Some(level)
}

/// Разбирает "/cmd@BotName арг" на имя команды и первый аргумент.
/// Суффикс @BotName отбрасывается, чтобы команду нельзя было обойти
/// обращением через упоминание бота.
pub fn parse_command(text: &str) -> (&str, Option<&str>) {
    let mut parts = text.trim().split_whitespace();
    let cmd_raw = parts.next().unwrap_or("");
    // /cmd or /cmd@BotName
    let cmd = cmd_raw
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("");
    (cmd, parts.next())
}

/// Обрабатывает команду. `Ok(false)` — текст не является известной командой,
/// вызывающий конвейер продолжает обработку сообщения как обычного текста.
pub async fn handle_command(
    bot: &Bot,
    state: Arc<AppState>,
    msg: &Message,
    text: &str,
) -> Result<bool> {
    let (cmd, arg) = parse_command(text);
    let Some(required) = required_level(cmd) else {
        return Ok(false);
    };
    let Some(user) = &msg.from else {
        return Ok(true);
    };

    if required > 0 {
        let level = state.admin_level(user).await?.unwrap_or(0);
        if level < required {
            debug!(
                "отказ в команде /{} (user={}, level={}, required={})",
                cmd, user.id, level, required
            );
            bot.send_message(msg.chat.id, "⛔ У вас недостаточно прав для этой команды")
                .await?;
            return Ok(true);
        }
    }

    match cmd {
        "start" => handlers::user::start(bot, state, msg).await?,
        "channel" => handlers::user::channel(bot, state, msg).await?,
        "stats" => handlers::stats::stats_command(bot, state, msg).await?,
        "admin" => handlers::menu::admin_command(bot, state, msg).await?,
        "broadcast" => handlers::broadcast::broadcast_command(bot, state, msg).await?,
        "ban" => handlers::users::ban_command(bot, state, msg, arg).await?,
        "unban" => handlers::users::unban_command(bot, state, msg, arg).await?,
        "edit_channels" => handlers::channels::edit_channels_command(bot, state, msg).await?,
        "edit_notification" => {
            handlers::template_editor::edit_notification_command(bot, state, msg).await?
        }
        "edit_welcome" => handlers::template_editor::edit_welcome_command(bot, state, msg).await?,
        "logs" => handlers::menu::logs_command(bot, state, msg).await?,
        "backup" => handlers::menu::backup_command(bot, state, msg).await?,
        _ => unreachable!("команда прошла проверку required_level"),
    }

    Ok(true)
}

/// Набор команд в меню по уровню доступа. /edit_welcome намеренно не в меню:
/// команда рабочая, но дублирует кнопку админ-панели.
fn commands_for_level(level: i32) -> Vec<BotCommand> {
    let mut commands = vec![
        BotCommand::new("start", "Запуск бота"),
        BotCommand::new("channel", "Ссылка на актуальный канал"),
    ];
    if level >= 1 {
        commands.push(BotCommand::new("admin", "Админ панель"));
        commands.push(BotCommand::new("stats", "Статистика пользователей"));
    }
    if level >= 2 {
        commands.push(BotCommand::new(
            "ban",
            "ПИШИТЕ /ban {ID} Выключить уведомления по ID",
        ));
        commands.push(BotCommand::new(
            "unban",
            "ПИШИТЕ /unban {ID} Включить уведомления по ID",
        ));
        commands.push(BotCommand::new(
            "edit_channels",
            "Назначить основной/резервный канал",
        ));
        commands.push(BotCommand::new(
            "edit_notification",
            "Изменение сообщения рассылки",
        ));
    }
    if level >= 3 {
        commands.push(BotCommand::new("logs", "Получить Логи"));
        commands.push(BotCommand::new("backup", "Сделать бэкап"));
    }
    commands
}

/// Чаты админов и разработчиков с их уровнями (разработчик всегда 3).
async fn admin_scopes(state: &AppState) -> Result<Vec<(i64, i32)>> {
    let mut scopes: Vec<(i64, i32)> = db::admins::all(&state.db)
        .await?
        .into_iter()
        .map(|a| (a.user_id, a.level))
        .collect();
    for dev in &state.cfg.developer_ids {
        let id = dev.0 as i64;
        match scopes.iter_mut().find(|(uid, _)| *uid == id) {
            Some(entry) => entry.1 = 3,
            None => scopes.push((id, 3)),
        }
    }
    Ok(scopes)
}

/// Выставляет меню команд: общее для всех и расширенное в личках админов.
pub async fn setup_commands(bot: &Bot, state: &AppState) -> Result<()> {
    bot.set_my_commands(commands_for_level(0))
        .scope(BotCommandScope::Default)
        .await?;

    for (user_id, level) in admin_scopes(state).await? {
        let scope = BotCommandScope::Chat {
            chat_id: Recipient::Id(ChatId(user_id)),
        };
        if let Err(e) = bot
            .set_my_commands(commands_for_level(level))
            .scope(scope)
            .await
        {
            // лички, куда бот ещё не писал, недоступны для set_my_commands
            warn!("не удалось выставить меню админа (user={user_id}): {e}");
        }
    }
    Ok(())
}

/// Сбрасывает расширенные меню админов при остановке бота.
pub async fn delete_commands(bot: &Bot, state: &AppState) {
    let Ok(scopes) = admin_scopes(state).await else {
        return;
    };
    for (user_id, _) in scopes {
        let scope = BotCommandScope::Chat {
            chat_id: Recipient::Id(ChatId(user_id)),
        };
        let _ = bot.delete_my_commands().scope(scope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_bot_mention() {
        assert_eq!(parse_command("/start"), ("start", None));
        assert_eq!(parse_command("/start@SomeBot"), ("start", None));
        assert_eq!(parse_command("/ban 123456"), ("ban", Some("123456")));
        assert_eq!(parse_command("/ban@SomeBot 123456"), ("ban", Some("123456")));
        assert_eq!(parse_command("  /channel  "), ("channel", None));
        assert_eq!(parse_command(""), ("", None));
    }

    #[test]
    fn access_map_levels() {
        assert_eq!(required_level("start"), Some(0));
        assert_eq!(required_level("channel"), Some(0));
        assert_eq!(required_level("admin"), Some(1));
        assert_eq!(required_level("stats"), Some(1));
        assert_eq!(required_level("broadcast"), Some(1));
        assert_eq!(required_level("ban"), Some(2));
        assert_eq!(required_level("edit_welcome"), Some(2));
        assert_eq!(required_level("logs"), Some(3));
        assert_eq!(required_level("backup"), Some(3));
        assert_eq!(required_level("selfdestruct"), None);
    }

    #[test]
    fn menus_are_nested_by_level() {
        let base = commands_for_level(0);
        let admin = commands_for_level(1);
        let dev = commands_for_level(3);
        assert_eq!(base.len(), 2);
        assert!(admin.len() > base.len());
        assert!(dev.iter().any(|c| c.command == "backup"));
        // /edit_welcome доступна, но в меню не показывается
        assert!(dev.iter().all(|c| c.command != "edit_welcome"));
    }
}
