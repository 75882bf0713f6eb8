//! Все inline-клавиатуры бота. Callback-грамматика:
//! `admin_*` — панель, `notif_*` / `welcome_*` — редакторы шаблонов,
//! `broadcast_*` — быстрая рассылка, `select_*` / `*_page_*` — выбор канала,
//! `no_action` / `current_page` — заглушки.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::db::admins::Admin;
use crate::db::broadcasts::Broadcast;
use crate::db::channels::Channel;
use crate::db::chat::DialogPreview;
use crate::db::users::User;
use crate::dialogs::TemplateTarget;
use crate::templates::TemplateButton;

fn btn(text: impl Into<String>, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, data)
}

// ---------- пользовательские ----------

pub fn captcha_refresh() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("🔄 Обновить капчу", "refresh_captcha")]])
}

// ---------- главное меню ----------

pub fn main_menu(level: i32) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            btn("📊 Статистика", "admin_stats"),
            btn("👤 Пользователи", "admin_users"),
        ],
        vec![btn("💬 Сообщения", "admin_messages")],
        vec![btn("📢 Рассылка", "admin_broadcast")],
        vec![btn("📝 Редактировать уведомление", "admin_notif")],
        vec![btn(
            "📝 Редактирование приветственного сообщения",
            "admin_welcome",
        )],
    ];
    if level >= 2 {
        rows.push(vec![btn("📢 Управление каналами", "admin_channels")]);
    }
    if level >= 3 {
        rows.push(vec![
            btn("📜 Логи", "admin_logs"),
            btn("💾 Бэкап", "admin_backup"),
        ]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn back_to_main() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("◀ В главное меню", "admin_main")]])
}

// ---------- пользователи ----------

pub fn users_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("🔍 Поиск пользователя", "admin_search_user")],
        vec![btn("🧾 Список пользователей", "admin_users_list")],
        vec![btn("◀ Назад", "admin_main")],
    ])
}

pub fn search_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("🔍 По username", "admin_search_username")],
        vec![btn("🔍 По имени/фамилии", "admin_search_nickname")],
        vec![btn("🔍 По ID", "admin_search_id")],
        vec![btn("◀ Назад", "admin_users")],
    ])
}

pub fn cancel_search() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("❌ Отменить поиск", "admin_users")]])
}

pub fn back_to_search() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("🔙 Вернуться к поиску", "admin_search_menu")]])
}

/// Карточка пользователя. Управление правами видно супер-админам (уровень > 1).
pub fn profile_menu(user: &User, target_admin: Option<&Admin>, viewer_level: i32) -> InlineKeyboardMarkup {
    let id = user.user_id;
    let mut rows = Vec::new();

    if user.should_notify {
        rows.push(vec![btn(
            "❌ Не уведомлять пользователя",
            format!("admin_ban_{id}"),
        )]);
    } else {
        rows.push(vec![btn(
            "✅ Уведомлять пользователя",
            format!("admin_unban_{id}"),
        )]);
    }

    if viewer_level > 1 {
        if target_admin.is_some() {
            rows.push(vec![btn("👑 Снять админа", format!("admin_revoke_{id}"))]);
        } else {
            rows.push(vec![btn("👑 Назначить админом", format!("admin_grant_{id}"))]);
        }

        if let Some(admin) = target_admin {
            rows.push(vec![btn(
                format!("Текущий уровень: {}", admin.level),
                "no_action",
            )]);
            let mut level_row = Vec::new();
            for level in 1..=3 {
                if level == admin.level {
                    continue;
                }
                level_row.push(btn(
                    format!("Установить уровень {level}"),
                    format!("admin_setlevel_{id}_{level}"),
                ));
                if level_row.len() == 2 {
                    rows.push(std::mem::take(&mut level_row));
                }
            }
            if !level_row.is_empty() {
                rows.push(level_row);
            }
        }
    }

    rows.push(vec![btn("◀ Назад", "admin_users")]);
    InlineKeyboardMarkup::new(rows)
}

// ---------- каналы ----------

pub fn channels_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![
            btn("🔄 Сменить основной канал", "admin_change_main"),
            btn("🔄 Сменить резервный канал", "admin_change_backup"),
        ],
        vec![btn("◀ Назад", "admin_main")],
    ])
}

/// Список каналов с пагинацией. `prefix` — "main" либо "backup".
pub fn channels_list(
    channels: &[Channel],
    page: usize,
    total_pages: usize,
    prefix: &str,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .map(|c| {
            vec![btn(
                format!("📢 {}", c.title),
                format!("select_{prefix}_{}", c.channel_id),
            )]
        })
        .collect();

    if let Some(pager) = pagination_row(page, total_pages, prefix) {
        rows.push(pager);
    }
    rows.push(vec![btn("◀ Вернуться Назад", "admin_channels")]);
    InlineKeyboardMarkup::new(rows)
}

/// Строка пагинации: ⬅️ / «{тек}/{всего}» / ➡️. Одна страница — строки нет.
pub fn pagination_row(
    page: usize,
    total_pages: usize,
    prefix: &str,
) -> Option<Vec<InlineKeyboardButton>> {
    if total_pages <= 1 {
        return None;
    }
    let mut row = Vec::new();
    if page > 1 {
        row.push(btn("⬅️ Назад", format!("{prefix}_page_{}", page - 1)));
    }
    row.push(btn(format!("{page}/{total_pages}"), "current_page"));
    if page < total_pages {
        row.push(btn("➡️ Вперед", format!("{prefix}_page_{}", page + 1)));
    }
    Some(row)
}

/// Приглашение прислать ссылку для только что добавленного канала.
pub fn channel_link_prompt(channel_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn(
        "🔗 Отправить ссылку",
        format!("admin_link_channel_{channel_id}"),
    )]])
}

pub fn channel_link_waiting() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("⏳ Ожидаю ссылку...", "no_action")]])
}

pub fn channel_link_saved() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("✅ Ссылка сохранена", "no_action")]])
}

// ---------- статистика ----------

pub fn stats_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![
            btn("📅 За период", "admin_stats_period"),
            btn("📊 За 7 дней", "admin_stats_7days"),
        ],
        vec![btn("◀ Назад", "admin_main")],
    ])
}

// ---------- редакторы шаблонов ----------

/// Меню шаблона; у уведомления есть дополнительная кнопка запуска рассылки.
pub fn template_menu(target: TemplateTarget) -> InlineKeyboardMarkup {
    let p = target.prefix();
    let mut rows = vec![
        vec![
            btn("✏️ Текст", format!("{p}_edit_text")),
            btn("🖼 Медиа", format!("{p}_edit_media")),
        ],
        vec![
            btn("🔘 Кнопки", format!("{p}_manage_buttons")),
            btn("👀 Предпросмотр", format!("{p}_preview")),
        ],
    ];
    if target == TemplateTarget::Notification {
        rows.push(vec![btn("✉️ Начать рассылку", "notif_send")]);
    }
    rows.push(vec![btn("◀ Назад", "admin_main")]);
    InlineKeyboardMarkup::new(rows)
}

/// «Назад» к меню конкретного шаблона.
pub fn back_to_template(target: TemplateTarget) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("◀️ Назад", template_menu_callback(target))]])
}

pub fn template_menu_callback(target: TemplateTarget) -> &'static str {
    match target {
        TemplateTarget::Welcome => "admin_welcome",
        TemplateTarget::Notification => "admin_notif",
    }
}

/// Экран управления медиа: кнопка удаления видна только когда медиа есть.
pub fn template_media_menu(target: TemplateTarget, has_media: bool) -> InlineKeyboardMarkup {
    let p = target.prefix();
    let mut rows = Vec::new();
    if has_media {
        rows.push(vec![btn("❌ Удалить медиа", format!("{p}_remove_media"))]);
    }
    rows.push(vec![btn("◀️ Назад", template_menu_callback(target))]);
    InlineKeyboardMarkup::new(rows)
}

pub fn template_buttons_menu(target: TemplateTarget) -> InlineKeyboardMarkup {
    let p = target.prefix();
    InlineKeyboardMarkup::new([
        vec![
            btn("➕ Добавить кнопку", format!("{p}_add_button")),
            btn("➖ Удалить кнопку", format!("{p}_remove_button")),
        ],
        vec![btn("🗑 Очистить все", format!("{p}_clear_buttons"))],
        vec![btn("◀ Назад", template_menu_callback(target))],
    ])
}

/// Выбор типа добавляемой кнопки; `back` — куда вести «Назад».
pub fn button_kind_menu(prefix: &str, back: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![btn("🔗 URL-кнопка", format!("{prefix}_type_url"))],
        vec![btn("💬 Текстовая кнопка", format!("{prefix}_type_text"))],
    ];
    if let Some(target) = back {
        rows.push(vec![btn("◀ Назад", target)]);
    }
    InlineKeyboardMarkup::new(rows)
}

/// Выбор кнопки для удаления: по одной в ряд, нумерация с единицы.
pub fn remove_buttons_list(buttons: &[TemplateButton], prefix: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .iter()
        .enumerate()
        .map(|(i, b)| {
            vec![btn(
                format!("{}. {}", i + 1, b.text),
                format!("{prefix}_removebtn_{i}"),
            )]
        })
        .collect();
    rows.push(vec![btn(
        "◀ Назад",
        format!("{prefix}_manage_buttons"),
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// «Назад» из запроса названия кнопки — к выбору её типа.
pub fn back_to_add_button(prefix: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("◀️ Назад", format!("{prefix}_add_button"))]])
}

pub fn back_to_notification() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("◀ Назад в меню рассылки", "admin_notif")]])
}

/// Подтверждение рассылки по шаблону уведомления.
pub fn confirm_send_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        btn("✅ Да, отправить", "confirm_send"),
        btn("❌ Отменить", "admin_notif"),
    ]])
}

// ---------- быстрая рассылка ----------

pub fn broadcast_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("✉️ Быстрая рассылка", "broadcast_quick")],
        vec![btn("📜 История рассылок", "broadcast_history")],
        vec![btn("◀ Назад", "admin_main")],
    ])
}

pub fn back_to_broadcast() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("◀ Назад", "admin_broadcast")]])
}

/// После получения контента: добавить кнопки либо перейти к подтверждению.
pub fn broadcast_buttons_offer() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("➕ Добавить кнопку", "broadcast_add_button")],
        vec![btn("➡️ Продолжить без кнопок", "broadcast_finish_buttons")],
        vec![btn("❌ Отменить", "admin_broadcast")],
    ])
}

pub fn broadcast_add_another() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("➕ Добавить еще кнопку", "broadcast_add_another")],
        vec![btn("✅ Завершить", "broadcast_finish_buttons")],
    ])
}

pub fn broadcast_confirm_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        btn("✅ Да, отправить", "broadcast_confirm"),
        btn("❌ Отменить", "admin_broadcast"),
    ]])
}

/// История: по кнопке на запись.
pub fn broadcast_history_list(broadcasts: &[Broadcast]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = broadcasts
        .iter()
        .map(|b| {
            vec![btn(
                format!("📊 #{} от {}", b.id, b.sent_at.format("%d.%m.%Y")),
                format!("broadcast_details:{}", b.id),
            )]
        })
        .collect();
    rows.push(vec![btn("◀ Назад", "admin_broadcast")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn broadcast_details_menu(broadcast_id: i32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn(
            "🔁 Повторить рассылку",
            format!("broadcast_repeat:{broadcast_id}"),
        )],
        vec![btn(
            "👁 Показать мне",
            format!("broadcast_send:{broadcast_id}"),
        )],
        vec![btn("◀ Назад", "broadcast_history")],
    ])
}

// ---------- поддержка ----------

pub fn messages_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![btn("📥 Непрочитанные", "admin_messages_unread")],
        vec![btn("🕘 Последние", "admin_messages_recent")],
        vec![btn("◀ Назад", "admin_main")],
    ])
}

/// Список диалогов: открытие по кнопке, номера совпадают с текстом сводки.
pub fn dialogs_list(previews: &[DialogPreview]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = previews
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let name = d.full_name.as_deref().unwrap_or("Без имени");
            vec![btn(
                format!("{}. {}", i + 1, name),
                format!("admin_messages_open_{}", d.user_id),
            )]
        })
        .collect();
    rows.push(vec![btn("◀ Назад", "admin_messages")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn dialog_controls(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![
            btn("✏️ Ответить", format!("admin_messages_reply_{user_id}")),
            btn("🔄 Обновить", format!("admin_messages_open_{user_id}")),
        ],
        vec![btn("◀ Назад", "admin_messages")],
    ])
}

pub fn reply_cancel() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn("❌ Отменить", "admin_messages")]])
}

/// Кнопка под уведомлением «новое сообщение от пользователя».
pub fn chat_notification(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[btn(
        "💬 Открыть диалог",
        format!("admin_messages_open_{user_id}"),
    )]])
}

// ---------- логи ----------

/// Первые 7 файлов, по одному в ряд.
pub fn logs_list(names: &[String]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = names
        .iter()
        .take(7)
        .map(|n| vec![btn(n.clone(), format!("logs-{n}"))])
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_of(b: &InlineKeyboardButton) -> &str {
        match &b.kind {
            InlineKeyboardButtonKind::CallbackData(d) => d,
            other => panic!("ожидался callback, получено {other:?}"),
        }
    }

    #[test]
    fn main_menu_grows_with_level() {
        let base = main_menu(1).inline_keyboard.len();
        let superadmin = main_menu(2).inline_keyboard.len();
        let developer = main_menu(3).inline_keyboard.len();
        assert!(base < superadmin);
        assert!(superadmin < developer);
    }

    #[test]
    fn profile_menu_hides_rights_from_regular_admins() {
        let user = User {
            user_id: 7,
            username: Some("u".into()),
            full_name: "U".into(),
            is_active: true,
            is_banned: false,
            captcha_passed: true,
            should_notify: true,
            join_date: chrono::Utc::now(),
            banned_when: None,
        };
        let kb_regular = profile_menu(&user, None, 1);
        // только переключатель уведомлений и «Назад»
        assert_eq!(kb_regular.inline_keyboard.len(), 2);
        assert_eq!(callback_of(&kb_regular.inline_keyboard[0][0]), "admin_ban_7");

        let kb_super = profile_menu(&user, None, 2);
        assert_eq!(kb_super.inline_keyboard.len(), 3);
        assert_eq!(callback_of(&kb_super.inline_keyboard[1][0]), "admin_grant_7");
    }

    #[test]
    fn profile_menu_offers_other_levels() {
        let user = User {
            user_id: 7,
            username: None,
            full_name: "U".into(),
            is_active: true,
            is_banned: false,
            captcha_passed: true,
            should_notify: false,
            join_date: chrono::Utc::now(),
            banned_when: None,
        };
        let admin = Admin {
            user_id: 7,
            username: None,
            full_name: "U".into(),
            level: 2,
        };
        let kb = profile_menu(&user, Some(&admin), 3);
        let all: Vec<&str> = kb
            .inline_keyboard
            .iter()
            .flatten()
            .map(callback_of)
            .collect();
        assert!(all.contains(&"admin_unban_7"));
        assert!(all.contains(&"admin_revoke_7"));
        assert!(all.contains(&"admin_setlevel_7_1"));
        assert!(all.contains(&"admin_setlevel_7_3"));
        assert!(!all.contains(&"admin_setlevel_7_2"));
    }

    #[test]
    fn pagination_row_edges() {
        assert!(pagination_row(1, 1, "main").is_none());

        let first = pagination_row(1, 3, "main").unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(callback_of(&first[1]), "main_page_2");

        let middle = pagination_row(2, 3, "backup").unwrap();
        assert_eq!(middle.len(), 3);
        assert_eq!(callback_of(&middle[0]), "backup_page_1");
        assert_eq!(callback_of(&middle[2]), "backup_page_3");

        let last = pagination_row(3, 3, "main").unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(callback_of(&last[0]), "main_page_2");
    }

    #[test]
    fn template_menu_send_only_for_notification() {
        let notif_kb = template_menu(TemplateTarget::Notification);
        let notif: Vec<&str> = notif_kb
            .inline_keyboard
            .iter()
            .flatten()
            .map(callback_of)
            .collect();
        assert!(notif.contains(&"notif_send"));

        let welcome_kb = template_menu(TemplateTarget::Welcome);
        let welcome: Vec<&str> = welcome_kb
            .inline_keyboard
            .iter()
            .flatten()
            .map(callback_of)
            .collect();
        assert!(welcome.iter().all(|c| !c.contains("send")));
        assert!(welcome.contains(&"welcome_preview"));
    }

    #[test]
    fn logs_list_caps_at_seven() {
        let names: Vec<String> = (0..10).map(|i| format!("2025_01_{i:02}")).collect();
        let kb = logs_list(&names);
        assert_eq!(kb.inline_keyboard.len(), 7);
        assert_eq!(callback_of(&kb.inline_keyboard[0][0]), "logs-2025_01_00");
    }
}
