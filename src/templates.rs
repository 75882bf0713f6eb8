//! Шаблоны сообщений (приветствие, уведомление о смене канала) с JSON-персистом.
//!
//! Шаблон — текст с плейсхолдерами `&link`/`&title`, опциональное медиа
//! (file_id Телеграма) и до пяти кнопок: URL либо «текстовая» (по нажатию бот
//! отвечает сохранённым текстом через callback `{prefix}_textbtn:{id}`).

use std::path::PathBuf;
use std::sync::Mutex;
use std::{fs, io};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::{FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use uuid::Uuid;

pub const MAX_BUTTONS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonKind {
    Url,
    Text,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateButton {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    pub value: String,
}

impl TemplateButton {
    pub fn new(text: impl Into<String>, kind: ButtonKind, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            kind,
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub text: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub buttons: Vec<TemplateButton>,
}

impl MessageTemplate {
    pub fn welcome_default() -> Self {
        Self {
            text: "👋 Добро пожаловать!\n\nМы рады видеть вас в нашем сообществе.".to_string(),
            media_type: None,
            media_id: None,
            buttons: Vec::new(),
        }
    }

    pub fn notification_default() -> Self {
        Self {
            text: "🔔 Основной канал изменен!\n\nНовый канал: &title \nСсылка: &link".to_string(),
            media_type: None,
            media_id: None,
            buttons: Vec::new(),
        }
    }

    /// Подстановка данных канала в текст.
    pub fn fill(&self, link: &str, title: &str) -> String {
        self.text.replace("&link", link).replace("&title", title)
    }

    /// `false` — лимит кнопок исчерпан.
    pub fn add_button(&mut self, button: TemplateButton) -> bool {
        if self.buttons.len() >= MAX_BUTTONS {
            return false;
        }
        self.buttons.push(button);
        true
    }

    pub fn remove_button(&mut self, index: usize) -> bool {
        if index >= self.buttons.len() {
            return false;
        }
        self.buttons.remove(index);
        true
    }

    pub fn button_by_id(&self, id: &str) -> Option<&TemplateButton> {
        self.buttons.iter().find(|b| b.id == id)
    }
}

/// Клавиатура шаблона: кнопки по одной в ряд, текстовые — через
/// callback `{prefix}_textbtn:{id}`. Кнопок нет — клавиатуры нет.
pub fn template_keyboard(
    template: &MessageTemplate,
    callback_prefix: &str,
) -> Option<InlineKeyboardMarkup> {
    keyboard_for_buttons(&template.buttons, callback_prefix)
}

pub fn keyboard_for_buttons(
    buttons: &[TemplateButton],
    callback_prefix: &str,
) -> Option<InlineKeyboardMarkup> {
    if buttons.is_empty() {
        return None;
    }
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .iter()
        .filter_map(|b| match b.kind {
            ButtonKind::Url => b
                .value
                .parse()
                .ok()
                .map(|url| vec![InlineKeyboardButton::url(b.text.clone(), url)]),
            ButtonKind::Text => Some(vec![InlineKeyboardButton::callback(
                b.text.clone(),
                format!("{callback_prefix}_textbtn:{}", b.id),
            )]),
        })
        .collect();
    Some(InlineKeyboardMarkup::new(rows))
}

/// Отправка готового сообщения по шаблону: медиа определяет метод API.
pub async fn send_template(
    bot: &Bot,
    chat_id: ChatId,
    template: &MessageTemplate,
    text: &str,
    callback_prefix: &str,
) -> Result<Message> {
    let keyboard = template_keyboard(template, callback_prefix);
    let stored = |media_id: &str| InputFile::file_id(FileId(media_id.to_string()));

    let msg = match (template.media_type.as_deref(), template.media_id.as_deref()) {
        (Some("photo"), Some(media_id)) => {
            let mut req = bot
                .send_photo(chat_id, stored(media_id))
                .caption(text)
                .parse_mode(ParseMode::Html);
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?
        }
        (Some("video"), Some(media_id)) => {
            let mut req = bot
                .send_video(chat_id, stored(media_id))
                .caption(text)
                .parse_mode(ParseMode::Html);
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?
        }
        (Some("animation"), Some(media_id)) => {
            let mut req = bot
                .send_animation(chat_id, stored(media_id))
                .caption(text)
                .parse_mode(ParseMode::Html);
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?
        }
        (Some("document"), Some(media_id)) => {
            let mut req = bot
                .send_document(chat_id, stored(media_id))
                .caption(text)
                .parse_mode(ParseMode::Html);
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?
        }
        _ => {
            let mut req = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
            if let Some(kb) = keyboard {
                req = req.reply_markup(kb);
            }
            req.await?
        }
    };
    Ok(msg)
}

/// Файловое JSON-хранилище одного шаблона (в духе FileStore: недостающий
/// файл — дефолт, запись через tmp + rename).
pub struct TemplateStore {
    path: PathBuf,
    template: Mutex<MessageTemplate>,
}

impl TemplateStore {
    pub fn open(path: PathBuf, default: MessageTemplate) -> io::Result<Self> {
        let template = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| default.clone()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => default,
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            template: Mutex::new(template),
        })
    }

    /// Снимок текущего шаблона.
    pub fn get(&self) -> MessageTemplate {
        match self.template.lock() {
            Ok(t) => t.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Мутация + запись на диск. Возвращает то, что вернула мутация.
    pub fn update<R>(&self, f: impl FnOnce(&mut MessageTemplate) -> R) -> io::Result<R> {
        let mut guard = match self.template.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let out = f(&mut guard);
        self.save(&guard)?;
        Ok(out)
    }

    fn save(&self, template: &MessageTemplate) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?; // гарантируем каталог
        }
        // atomic-ish запись
        let tmp = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(template).expect("serialize template");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_placeholders() {
        let t = MessageTemplate {
            text: "Канал: &title \nСсылка: &link".into(),
            media_type: None,
            media_id: None,
            buttons: vec![],
        };
        let out = t.fill("https://t.me/x", "Новости");
        assert_eq!(out, "Канал: Новости \nСсылка: https://t.me/x");
    }

    #[test]
    fn button_limit_is_five() {
        let mut t = MessageTemplate::welcome_default();
        for i in 0..MAX_BUTTONS {
            assert!(t.add_button(TemplateButton::new(
                format!("b{i}"),
                ButtonKind::Text,
                "ответ"
            )));
        }
        assert!(!t.add_button(TemplateButton::new("лишняя", ButtonKind::Text, "x")));
        assert_eq!(t.buttons.len(), MAX_BUTTONS);
    }

    #[test]
    fn remove_button_by_index() {
        let mut t = MessageTemplate::welcome_default();
        t.add_button(TemplateButton::new("a", ButtonKind::Text, "1"));
        t.add_button(TemplateButton::new("b", ButtonKind::Text, "2"));
        assert!(t.remove_button(0));
        assert_eq!(t.buttons.len(), 1);
        assert_eq!(t.buttons[0].text, "b");
        assert!(!t.remove_button(5));
    }

    #[test]
    fn button_json_uses_type_field() {
        let b = TemplateButton::new("Сайт", ButtonKind::Url, "https://example.com");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "url");
        assert_eq!(json["value"], "https://example.com");
        let back: TemplateButton = serde_json::from_value(json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn text_buttons_become_callbacks() {
        let mut t = MessageTemplate::notification_default();
        t.add_button(TemplateButton::new("Инфо", ButtonKind::Text, "ответ"));
        let id = t.buttons[0].id.clone();
        let kb = template_keyboard(&t, "notif").unwrap();
        let row = &kb.inline_keyboard[0];
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].text, "Инфо");
        match &row[0].kind {
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => {
                assert_eq!(data, &format!("notif_textbtn:{id}"));
            }
            other => panic!("ожидался callback, получено {other:?}"),
        }
    }

    #[test]
    fn no_buttons_no_keyboard() {
        let t = MessageTemplate::welcome_default();
        assert!(template_keyboard(&t, "welcome").is_none());
    }
}
