//! Состояния админских диалогов. Живут в памяти (DashMap по id админа):
//! короткие сценарии, потеря при рестарте допустима. Пользовательская
//! сторона (капча, поддержка) состояний не требует — её ведёт БД.

use chrono::NaiveDate;
use teloxide::types::{ChatId, MessageId};

use crate::templates::{ButtonKind, TemplateButton};

/// Какой из двух шаблонов редактируется.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateTarget {
    Welcome,
    Notification,
}

impl TemplateTarget {
    /// Префикс callback-данных редактора ("welcome_*" / "notif_*").
    pub fn prefix(self) -> &'static str {
        match self {
            TemplateTarget::Welcome => "welcome",
            TemplateTarget::Notification => "notif",
        }
    }
}

/// Черновик быстрой рассылки: собирается по шагам, пишется в БД при отправке.
#[derive(Clone, Debug, Default)]
pub struct BroadcastDraft {
    /// Текст сообщения либо подпись к медиа, как их набрал админ.
    pub text: String,
    pub media_type: Option<String>,
    pub media_id: Option<String>,
    pub buttons: Vec<TemplateButton>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Username,
    Nickname,
    Id,
}

#[derive(Clone, Debug)]
pub enum Dialog {
    // --- быстрая рассылка ---
    /// Ждём сообщение-контент.
    BroadcastContent,
    /// Контент собран; решения (кнопки, подтверждение) приходят callback'ами.
    BroadcastReady { draft: BroadcastDraft },
    /// Ждём название кнопки.
    BroadcastButtonLabel { draft: BroadcastDraft, kind: ButtonKind },
    /// Ждём URL либо текст ответа кнопки.
    BroadcastButtonValue {
        draft: BroadcastDraft,
        kind: ButtonKind,
        label: String,
    },

    // --- редакторы шаблонов (приветствие / уведомление) ---
    TemplateText { target: TemplateTarget },
    TemplateMedia { target: TemplateTarget },
    TemplateButtonLabel { target: TemplateTarget, kind: ButtonKind },
    TemplateButtonValue {
        target: TemplateTarget,
        kind: ButtonKind,
        label: String,
    },
    /// Показан предпросмотр; сообщение удаляется при возврате в меню шаблона.
    TemplatePreview { chat: ChatId, msg: MessageId },

    // --- поиск пользователей ---
    SearchQuery { mode: SearchMode },
    /// После списка результатов: ждём ID для показа профиля.
    SearchPickId,

    // --- поддержка ---
    SupportReply { user_id: i64 },

    // --- статистика за период ---
    StatsPeriodStart,
    StatsPeriodEnd { start: NaiveDate },

    // --- регистрация канала ---
    /// Ждём пригласительную ссылку; prompt — сообщение с кнопкой, чью
    /// клавиатуру меняем после сохранения.
    ChannelLink {
        channel_id: i64,
        prompt_chat: ChatId,
        prompt_msg: MessageId,
    },
}
