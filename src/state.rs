//! Общее состояние приложения: конфиг, пул БД, админские диалоги, шаблоны.

use anyhow::Result;
use dashmap::DashMap;
use sqlx::PgPool;
use teloxide::types::{User, UserId};

use crate::config::Config;
use crate::db;
use crate::dialogs::{Dialog, TemplateTarget};
use crate::templates::{MessageTemplate, TemplateStore};

pub struct AppState {
    pub cfg: Config,
    pub db: PgPool,
    /// Активные диалоги админов (ключ — id админа).
    pub dialogs: DashMap<UserId, Dialog>,
    pub welcome: TemplateStore,
    pub notification: TemplateStore,
}

impl AppState {
    pub fn new(cfg: Config, db: PgPool) -> Result<Self> {
        let welcome = TemplateStore::open(
            cfg.data_dir.join("welcome_template.json"),
            MessageTemplate::welcome_default(),
        )?;
        let notification = TemplateStore::open(
            cfg.data_dir.join("notification_template.json"),
            MessageTemplate::notification_default(),
        )?;
        Ok(Self {
            cfg,
            db,
            dialogs: DashMap::new(),
            welcome,
            notification,
        })
    }

    pub fn template_store(&self, target: TemplateTarget) -> &TemplateStore {
        match target {
            TemplateTarget::Welcome => &self.welcome,
            TemplateTarget::Notification => &self.notification,
        }
    }

    // ---------- диалоги ----------

    pub fn set_dialog(&self, admin: UserId, dialog: Dialog) {
        self.dialogs.insert(admin, dialog);
    }

    /// Снимок текущего состояния (диалог остаётся активным).
    pub fn dialog(&self, admin: UserId) -> Option<Dialog> {
        self.dialogs.get(&admin).map(|d| d.clone())
    }

    /// Забрать состояние, завершив диалог.
    pub fn take_dialog(&self, admin: UserId) -> Option<Dialog> {
        self.dialogs.remove(&admin).map(|(_, d)| d)
    }

    pub fn clear_dialog(&self, admin: UserId) {
        self.dialogs.remove(&admin);
    }

    // ---------- права ----------

    /// Уровень доступа: разработчики из конфига получают 3 без строки в БД.
    pub async fn admin_level(&self, user: &User) -> Result<Option<i32>> {
        if self.cfg.is_developer(user.id) {
            return Ok(Some(3));
        }
        let admin = db::admins::get(&self.db, user.id.0 as i64).await?;
        Ok(admin.map(|a| a.level))
    }
}
