// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailcastResult;
use crate::raise_error;
use mail_send::smtp::message::IntoMessage;
use mail_send::SmtpClient;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pub enum MailcastSmtpClient {
    Plain(SmtpClient<TcpStream>),
    Tls(SmtpClient<TlsStream<TcpStream>>),
}

pub(crate) trait Sender {
    async fn send_noop(&mut self) -> MailcastResult<()>;
    async fn reset(&mut self) -> MailcastResult<()>;
    /// Raw `mail_send` error so callers can read the SMTP reply code.
    async fn send_email<'x>(
        &mut self,
        message: impl IntoMessage<'x>,
    ) -> Result<(), mail_send::Error>;
}

impl Sender for MailcastSmtpClient {
    async fn send_noop(&mut self) -> MailcastResult<()> {
        match self {
            MailcastSmtpClient::Plain(smtp_client) => smtp_client
                .noop()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
            MailcastSmtpClient::Tls(smtp_client) => smtp_client
                .noop()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
        }
    }

    async fn reset(&mut self) -> MailcastResult<()> {
        match self {
            MailcastSmtpClient::Plain(smtp_client) => smtp_client
                .rset()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
            MailcastSmtpClient::Tls(smtp_client) => smtp_client
                .rset()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
        }
    }

    async fn send_email<'x>(
        &mut self,
        message: impl IntoMessage<'x>,
    ) -> Result<(), mail_send::Error> {
        match self {
            MailcastSmtpClient::Plain(smtp_client) => smtp_client.send(message).await,
            MailcastSmtpClient::Tls(smtp_client) => smtp_client.send(message).await,
        }
    }
}
