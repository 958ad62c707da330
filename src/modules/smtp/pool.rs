// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailcastError;
use crate::modules::error::MailcastResult;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::smtp::client::MailcastSmtpClient;
use crate::modules::smtp::client::Sender;
use crate::modules::smtp::manager::{SmtpClientManager, SmtpServerConfig};
use bb8::Pool;
use std::time::Duration;

impl bb8::ManageConnection for SmtpClientManager {
    type Connection = MailcastSmtpClient;
    type Error = MailcastError;

    async fn connect(&self) -> MailcastResult<Self::Connection> {
        self.build().await
    }

    // call this function before using the connection
    async fn is_valid(&self, conn: &mut Self::Connection) -> MailcastResult<()> {
        conn.send_noop().await?;
        conn.reset().await
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

/// Connections are opened lazily, so a relay that is down does not block startup.
pub fn build_smtp_pool(config: SmtpServerConfig) -> Pool<SmtpClientManager> {
    let connection_timeout = config.timeout;
    let manager = SmtpClientManager::new(config);
    Pool::builder()
        .connection_timeout(connection_timeout)
        .idle_timeout(Duration::from_secs(120))
        .retry_connection(true)
        .max_size(SETTINGS.mailcast_smtp_pool_size)
        .test_on_check_out(true)
        .build_unchecked(manager)
}
