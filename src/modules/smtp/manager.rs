// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailcastResult;
use crate::modules::settings::cli::{Encryption, Settings};
use crate::modules::smtp::client::MailcastSmtpClient;
use crate::raise_error;
use mail_send::{Credentials, SmtpClientBuilder};
use std::time::Duration;

/// Connection parameters of the outbound relay.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SmtpServerConfig {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl SmtpServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.mailcast_smtp_host.clone(),
            port: settings.mailcast_smtp_port,
            encryption: settings.mailcast_smtp_encryption,
            username: settings.mailcast_smtp_username.clone(),
            password: settings.mailcast_smtp_password.clone(),
            timeout: Duration::from_secs(settings.mailcast_smtp_timeout_seconds),
        }
    }

    /// Credentials are optional, but a username without a password is not.
    pub fn credentials(&self) -> MailcastResult<Option<Credentials<String>>> {
        match (&self.username, &self.password) {
            (None, _) => Ok(None),
            (Some(username), Some(password)) => {
                Ok(Some(Credentials::new(username.clone(), password.clone())))
            }
            (Some(username), None) => Err(raise_error!(
                format!("smtp username '{}' is set, but password not set", username),
                ErrorCode::MissingConfiguration
            )),
        }
    }
}

pub struct SmtpClientManager {
    config: SmtpServerConfig,
}

impl SmtpClientManager {
    pub fn new(config: SmtpServerConfig) -> Self {
        Self { config }
    }

    pub async fn build(&self) -> MailcastResult<MailcastSmtpClient> {
        let local_host = gethostname::gethostname()
            .to_str()
            .unwrap_or("[127.0.0.1]")
            .to_string();

        let mut builder = SmtpClientBuilder::new(self.config.host.clone(), self.config.port)
            .helo_host(local_host)
            .timeout(self.config.timeout);
        if let Some(credentials) = self.config.credentials()? {
            builder = builder.credentials(credentials);
        }

        let client = match self.config.encryption {
            Encryption::Ssl => {
                let client = builder.implicit_tls(true).connect().await.map_err(|e| {
                    raise_error!(format!("{:#?}", e), ErrorCode::SmtpConnectionFailed)
                })?;
                MailcastSmtpClient::Tls(client)
            }
            Encryption::StartTls => {
                let client = builder.implicit_tls(false).connect().await.map_err(|e| {
                    raise_error!(format!("{:#?}", e), ErrorCode::SmtpConnectionFailed)
                })?;
                MailcastSmtpClient::Tls(client)
            }
            Encryption::None => {
                let client = builder.connect_plain().await.map_err(|e| {
                    raise_error!(format!("{:#?}", e), ErrorCode::SmtpConnectionFailed)
                })?;
                MailcastSmtpClient::Plain(client)
            }
        };

        Ok(client)
    }
}
