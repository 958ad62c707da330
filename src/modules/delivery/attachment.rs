// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{future::Future, path::PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{
    modules::{
        error::{code::ErrorCode, MailcastResult},
        settings::dir::DATA_DIR_MANAGER,
    },
    raise_error,
};

pub trait AttachmentStore {
    /// Reads the full content behind an opaque storage reference.
    fn fetch(
        &self,
        storage_reference: &str,
    ) -> impl Future<Output = MailcastResult<Vec<u8>>> + Send;

    /// Stores content under `storage_reference`, replacing earlier content.
    fn store(
        &self,
        storage_reference: &str,
        data: &[u8],
    ) -> impl Future<Output = MailcastResult<()>> + Send;
}

/// Content-addressed attachment cache on local disk.
#[derive(Clone, Debug)]
pub struct DiskAttachmentStore {
    cache_dir: PathBuf,
}

impl DiskAttachmentStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn init() -> Self {
        Self::new(DATA_DIR_MANAGER.attachment_cache.clone())
    }

    fn cache_dir(&self) -> MailcastResult<&str> {
        self.cache_dir.to_str().ok_or_else(|| {
            raise_error!(
                "Failed to convert cache_dir to str".into(),
                ErrorCode::InternalError
            )
        })
    }
}

impl AttachmentStore for DiskAttachmentStore {
    async fn fetch(&self, storage_reference: &str) -> MailcastResult<Vec<u8>> {
        let cache_dir = self.cache_dir()?;
        cacache::read(cache_dir, storage_reference)
            .await
            .map_err(|e| match e {
                cacache::Error::EntryNotFound(..) => raise_error!(
                    format!("Attachment '{}' not found", storage_reference),
                    ErrorCode::AttachmentFetchFailed
                ),
                other => raise_error!(
                    format!(
                        "Failed to read attachment '{}': {:#?}",
                        storage_reference, other
                    ),
                    ErrorCode::AttachmentFetchFailed
                ),
            })
    }

    async fn store(&self, storage_reference: &str, data: &[u8]) -> MailcastResult<()> {
        let cache_dir = self.cache_dir()?;
        let mut writer = cacache::Writer::create(cache_dir, storage_reference)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        writer
            .commit()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stored_attachments_can_be_fetched() {
        let dir = tempdir().unwrap();
        let store = DiskAttachmentStore::new(dir.path().to_path_buf());
        store
            .store("campaigns/c1/report.pdf", b"%PDF-1.7 fake")
            .await
            .unwrap();
        let content = store.fetch("campaigns/c1/report.pdf").await.unwrap();
        assert_eq!(content, b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn missing_attachment_is_a_fetch_failure() {
        let dir = tempdir().unwrap();
        let store = DiskAttachmentStore::new(dir.path().to_path_buf());
        let err = store.fetch("nope").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AttachmentFetchFailed);
    }
}
