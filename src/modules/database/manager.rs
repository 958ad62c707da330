// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::context::Initialize;
use crate::modules::database::{CAMPAIGN_MODELS, QUEUE_MODELS};
use crate::modules::error::{code::ErrorCode, MailcastError, MailcastResult};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::raise_error;
use native_db::{Builder, Database, Models};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tracing::info;

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

pub struct DatabaseManager {
    /// Campaigns and contacts
    campaign_db: Arc<Database<'static>>,
    /// Recipient queue
    queue_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let campaign_db = Self::open(&CAMPAIGN_MODELS, DATA_DIR_MANAGER.campaign_db.clone())
            .expect("Failed to initialize campaign database");
        let queue_db = Self::open(&QUEUE_MODELS, DATA_DIR_MANAGER.queue_db.clone())
            .expect("Failed to initialize queue database");
        DatabaseManager {
            campaign_db,
            queue_db,
        }
    }

    pub fn campaign_db(&self) -> &Arc<Database<'static>> {
        &self.campaign_db
    }

    pub fn queue_db(&self) -> &Arc<Database<'static>> {
        &self.queue_db
    }

    fn open(
        models: &'static Models,
        path: PathBuf,
    ) -> MailcastResult<Arc<Database<'static>>> {
        info!("Opening database at: {:?}", &path);
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .mailcast_database_cache_size
                    .unwrap_or(134217728)
                    .max(67108864),
            ) //default 128MB
            .create(models, path)
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn handle_database_error(error: native_db::db_type::Error) -> MailcastError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::InternalError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::InternalError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::InternalError
                )
            }
        }
    }
}

/// In-memory databases for tests, one per call.
#[cfg(test)]
pub fn in_memory_campaign_db() -> Arc<Database<'static>> {
    Arc::new(Builder::new().create_in_memory(&CAMPAIGN_MODELS).unwrap())
}

#[cfg(test)]
pub fn in_memory_queue_db() -> Arc<Database<'static>> {
    Arc::new(Builder::new().create_in_memory(&QUEUE_MODELS).unwrap())
}

impl Initialize for DatabaseManager {
    async fn initialize() -> MailcastResult<()> {
        // Forces both databases open.
        let campaign_db = DB_MANAGER.campaign_db().clone();
        let queue_db = DB_MANAGER.queue_db().clone();
        tokio::task::spawn_blocking(move || {
            let _ = campaign_db.r_transaction();
            let _ = queue_db.r_transaction();
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }
}
