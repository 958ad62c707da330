// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::context::Initialize;
use crate::modules::settings::cli::SETTINGS;
use crate::{
    modules::error::{code::ErrorCode, MailcastResult},
    raise_error,
};
use std::path::PathBuf;
use std::sync::LazyLock;

pub const CAMPAIGN_FILE: &str = "campaign.db";
pub const QUEUE_FILE: &str = "queue.db";
const ATTACHMENT_CACHE_DIR: &str = "attachments";
const LOG_DIR: &str = "logs";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> =
    LazyLock::new(|| DataDirManager::new(PathBuf::from(&SETTINGS.mailcast_root_dir)));

#[derive(Debug)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub campaign_db: PathBuf,
    pub queue_db: PathBuf,
    pub attachment_cache: PathBuf,
    pub log_dir: PathBuf,
}

impl Initialize for DataDirManager {
    async fn initialize() -> MailcastResult<()> {
        DATA_DIR_MANAGER.create_all()
    }
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir: root_dir.clone(),
            campaign_db: root_dir.join(CAMPAIGN_FILE),
            queue_db: root_dir.join(QUEUE_FILE),
            attachment_cache: root_dir.join(ATTACHMENT_CACHE_DIR),
            log_dir: root_dir.join(LOG_DIR),
        }
    }

    pub fn create_all(&self) -> MailcastResult<()> {
        for dir in [&self.root_dir, &self.attachment_cache, &self.log_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        Ok(())
    }
}
