// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,
    TemplateRenderFailed = 10030,

    // Network connection errors (40000–40999)
    ConnectionPoolTimeout = 40020,

    // Mail service errors (50000–50999)
    SmtpCommandFailed = 50030,
    SmtpConnectionFailed = 50040,
    NoPrimaryRecipient = 50100,
    AttachmentFetchFailed = 50110,

    // Message queue errors (60000–60999)
    QueueReceiveFailed = 60000,
    QueueAcknowledgeFailed = 60010,
    MalformedQueueMessage = 60020,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}
