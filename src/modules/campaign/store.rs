// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{future::Future, sync::Arc};

use native_db::Database;

use crate::{
    modules::{
        campaign::{contact::ContactEntity, entity::CampaignEntity},
        database::{
            async_find_impl, conditional_update_impl, manager::DB_MANAGER, upsert_impl,
            UpdateOutcome,
        },
        error::{code::ErrorCode, MailcastResult},
    },
    raise_error,
};

pub trait CampaignStore {
    fn find_campaign(
        &self,
        campaign_id: &str,
    ) -> impl Future<Output = MailcastResult<Option<CampaignEntity>>> + Send;

    fn save_campaign(
        &self,
        campaign: CampaignEntity,
    ) -> impl Future<Output = MailcastResult<()>> + Send;

    /// Atomic read-check-write on one campaign row. `apply` returning `None`
    /// leaves the row untouched.
    fn update_campaign_if(
        &self,
        campaign_id: &str,
        apply: impl FnOnce(&CampaignEntity) -> Option<CampaignEntity> + Send + 'static,
    ) -> impl Future<Output = MailcastResult<UpdateOutcome<CampaignEntity>>> + Send;
}

pub trait ContactStore {
    fn find_contact(
        &self,
        address: &str,
    ) -> impl Future<Output = MailcastResult<Option<ContactEntity>>> + Send;

    fn save_contact(
        &self,
        contact: ContactEntity,
    ) -> impl Future<Output = MailcastResult<()>> + Send;
}

/// Campaign and contact rows kept in one native_db database.
#[derive(Clone)]
pub struct NativeCampaignStore {
    db: Arc<Database<'static>>,
}

impl NativeCampaignStore {
    pub fn new(db: Arc<Database<'static>>) -> Self {
        Self { db }
    }

    pub fn from_manager() -> Self {
        Self::new(DB_MANAGER.campaign_db().clone())
    }
}

impl CampaignStore for NativeCampaignStore {
    async fn find_campaign(&self, campaign_id: &str) -> MailcastResult<Option<CampaignEntity>> {
        async_find_impl(&self.db, campaign_id.to_string()).await
    }

    async fn save_campaign(&self, campaign: CampaignEntity) -> MailcastResult<()> {
        upsert_impl(&self.db, campaign).await
    }

    async fn update_campaign_if(
        &self,
        campaign_id: &str,
        apply: impl FnOnce(&CampaignEntity) -> Option<CampaignEntity> + Send + 'static,
    ) -> MailcastResult<UpdateOutcome<CampaignEntity>> {
        let key = campaign_id.to_string();
        conditional_update_impl(
            &self.db,
            move |rw| {
                rw.get()
                    .primary::<CampaignEntity>(key)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
            },
            apply,
        )
        .await
    }
}

impl ContactStore for NativeCampaignStore {
    async fn find_contact(&self, address: &str) -> MailcastResult<Option<ContactEntity>> {
        async_find_impl(&self.db, address.to_string()).await
    }

    async fn save_contact(&self, contact: ContactEntity) -> MailcastResult<()> {
        upsert_impl(&self.db, contact).await
    }
}
