// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use tracing::{debug, info};

use crate::{
    modules::{
        context::Initialize,
        error::{code::ErrorCode, MailcastResult},
        settings::cli::{Encryption, SETTINGS},
    },
    raise_error,
};

/// Installs the ring crypto provider used by the SMTP relay's TLS sessions.
pub struct MailcastTls;

impl Initialize for MailcastTls {
    async fn initialize() -> MailcastResult<()> {
        if SETTINGS.mailcast_smtp_encryption == Encryption::None {
            debug!("SMTP relay is plain text, TLS provider not installed");
            return Ok(());
        }
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
            .map_err(|_| {
                raise_error!(
                    "failed to set crypto provider".into(),
                    ErrorCode::InternalError
                )
            })?;
        info!(
            "TLS crypto provider installed for {} relay",
            SETTINGS.mailcast_smtp_encryption
        );
        Ok(())
    }
}
