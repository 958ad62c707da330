// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::{builder::ValueParser, Parser, ValueEnum};
use std::{fmt, sync::LazyLock};

use crate::{
    modules::error::{code::ErrorCode, MailcastResult},
    raise_error,
};

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

fn positive_seconds() -> ValueParser {
    ValueParser::new(|s: &str| -> Result<f64, String> {
        let value = s
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
        if !value.is_finite() || value <= 0.0 {
            return Err("The value must be a positive number of seconds.".to_string());
        }
        Ok(value)
    })
}

#[derive(Debug, Parser)]
#[clap(
    name = "mailcast",
    about = "A campaign delivery worker that drains a recipient queue,
    personalizes each message and delivers it over SMTP with adaptive rate control.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailcast log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailcast"
    )]
    pub mailcast_log_level: String,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailcast_ansi_logs: bool,

    /// Enable log file output (default: false)
    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailcast_log_to_file: bool,

    /// Maximum number of log files (default: 5)
    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of server log files"
    )]
    pub mailcast_max_server_log_files: usize,

    #[clap(
        long,
        env,
        default_value = "./mailcast_data",
        help = "Set the data directory holding the campaign database, attachment cache and logs",
        value_parser = ValueParser::new(|s: &str| {
            if s.trim().is_empty() {
                return Err("The data directory must not be empty".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub mailcast_root_dir: String,

    #[clap(
        long,
        env,
        default_value = "134217728",
        help = "Set the cache size for the campaign database in bytes"
    )]
    pub mailcast_database_cache_size: Option<usize>,

    /// The IP address the metrics endpoint binds to.
    #[clap(
        long,
        env,
        default_value = "0.0.0.0",
        help = "The IPv4 address the metrics endpoint binds to",
        value_parser = ValueParser::new(|s: &str| {
            if s.parse::<std::net::Ipv4Addr>().is_err() {
                return Err("The bind IP address must be a valid IPv4 address.".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub mailcast_bind_ip: String,

    /// Metrics HTTP port (default: 15630)
    #[clap(
        long,
        default_value = "15630",
        env,
        help = "Set the HTTP port serving /metrics"
    )]
    pub mailcast_http_port: u16,

    #[clap(long, default_value = "localhost", env, help = "SMTP relay host")]
    pub mailcast_smtp_host: String,

    #[clap(long, default_value = "587", env, help = "SMTP relay port")]
    pub mailcast_smtp_port: u16,

    #[clap(
        long,
        default_value = "start-tls",
        env,
        help = "Connection encryption used towards the SMTP relay"
    )]
    pub mailcast_smtp_encryption: Encryption,

    #[clap(long, env, help = "SMTP username, authentication is skipped when unset")]
    pub mailcast_smtp_username: Option<String>,

    #[clap(long, env, help = "SMTP password")]
    pub mailcast_smtp_password: Option<String>,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Timeout in seconds for a single SMTP command",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailcast_smtp_timeout_seconds: u64,

    #[clap(
        long,
        default_value = "10",
        env,
        help = "Maximum number of pooled SMTP connections",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailcast_smtp_pool_size: u32,

    #[clap(
        long,
        default_value = "0.1",
        env,
        help = "Base delay in seconds applied before every send",
        value_parser = positive_seconds()
    )]
    pub mailcast_base_delay_seconds: f64,

    #[clap(
        long,
        default_value = "5.0",
        env,
        help = "Upper bound in seconds for the per-message delay",
        value_parser = positive_seconds()
    )]
    pub mailcast_max_delay_seconds: f64,

    #[clap(
        long,
        default_value = "0.01",
        env,
        help = "Lower bound in seconds for the per-message delay",
        value_parser = positive_seconds()
    )]
    pub mailcast_min_delay_seconds: f64,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Consecutive throttle backoffs after which the delay is pinned at the maximum",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailcast_max_consecutive_backoffs: u32,

    #[clap(
        long,
        default_value = "60",
        env,
        help = "Seconds without throttling before the delay starts to decay",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailcast_throttle_recovery_window_seconds: u64,

    #[clap(
        long,
        default_value = "10",
        env,
        help = "Maximum number of queue entries handled by one worker invocation",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailcast_queue_batch_size: u32,

    #[clap(
        long,
        default_value = "960",
        env,
        help = "Seconds a received queue entry stays invisible before it is redelivered. \
                Must cover the invocation timeout",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailcast_queue_visibility_timeout_seconds: u64,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Receive attempts after which a queue entry is dead-lettered",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailcast_queue_max_receive_count: u32,

    #[clap(
        long,
        default_value = "1000",
        env,
        help = "Interval in milliseconds between queue polls when the queue is empty"
    )]
    pub mailcast_queue_poll_interval_ms: u64,

    #[clap(
        long,
        default_value = "900",
        env,
        help = "Wall-clock deadline in seconds for one worker invocation",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailcast_invocation_timeout_seconds: u64,

    #[clap(
        long,
        default_value = "10",
        env,
        help = "Stop starting new entries when fewer seconds than this remain before the deadline"
    )]
    pub mailcast_drain_margin_seconds: u64,

    #[clap(
        long,
        default_value = "3",
        env,
        help = "Retries for transient transport failures such as timeouts"
    )]
    pub mailcast_transport_retry_attempts: u32,

    #[clap(
        long,
        default_value = "500",
        env,
        help = "Pause in milliseconds between transient transport retries"
    )]
    pub mailcast_transport_retry_pause_ms: u64,

    #[clap(
        long,
        default_value = "1",
        env,
        help = "Number of worker invocations running concurrently in this process",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailcast_dispatcher_invocations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Encryption {
    None,
    StartTls,
    Ssl,
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encryption::None => write!(f, "none"),
            Encryption::StartTls => write!(f, "start-tls"),
            Encryption::Ssl => write!(f, "ssl"),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> MailcastResult<()> {
        if self.mailcast_min_delay_seconds > self.mailcast_max_delay_seconds {
            return Err(raise_error!(
                format!(
                    "min delay ({}s) must not exceed max delay ({}s)",
                    self.mailcast_min_delay_seconds, self.mailcast_max_delay_seconds
                ),
                ErrorCode::InvalidParameter
            ));
        }
        if self.mailcast_base_delay_seconds < self.mailcast_min_delay_seconds
            || self.mailcast_base_delay_seconds > self.mailcast_max_delay_seconds
        {
            return Err(raise_error!(
                format!(
                    "base delay ({}s) must lie within [{}s, {}s]",
                    self.mailcast_base_delay_seconds,
                    self.mailcast_min_delay_seconds,
                    self.mailcast_max_delay_seconds
                ),
                ErrorCode::InvalidParameter
            ));
        }
        if self.mailcast_drain_margin_seconds >= self.mailcast_invocation_timeout_seconds {
            return Err(raise_error!(
                "drain margin must be shorter than the invocation timeout".into(),
                ErrorCode::InvalidParameter
            ));
        }
        // An entry still being processed must not become visible to another poll.
        if self.mailcast_queue_visibility_timeout_seconds
            < self.mailcast_invocation_timeout_seconds
        {
            return Err(raise_error!(
                format!(
                    "visibility timeout ({}s) is shorter than the invocation timeout ({}s)",
                    self.mailcast_queue_visibility_timeout_seconds,
                    self.mailcast_invocation_timeout_seconds
                ),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self {
            mailcast_log_level: "info".to_string(),
            mailcast_ansi_logs: false,
            mailcast_log_to_file: false,
            mailcast_max_server_log_files: 5,
            mailcast_root_dir: std::env::temp_dir()
                .join("mailcast_test_data")
                .to_string_lossy()
                .into_owned(),
            mailcast_database_cache_size: None,
            mailcast_bind_ip: "127.0.0.1".into(),
            mailcast_http_port: 15630,
            mailcast_smtp_host: "localhost".into(),
            mailcast_smtp_port: 2525,
            mailcast_smtp_encryption: Encryption::None,
            mailcast_smtp_username: None,
            mailcast_smtp_password: None,
            mailcast_smtp_timeout_seconds: 5,
            mailcast_smtp_pool_size: 2,
            mailcast_base_delay_seconds: 0.1,
            mailcast_max_delay_seconds: 5.0,
            mailcast_min_delay_seconds: 0.01,
            mailcast_max_consecutive_backoffs: 5,
            mailcast_throttle_recovery_window_seconds: 60,
            mailcast_queue_batch_size: 10,
            mailcast_queue_visibility_timeout_seconds: 960,
            mailcast_queue_max_receive_count: 5,
            mailcast_queue_poll_interval_ms: 50,
            mailcast_invocation_timeout_seconds: 900,
            mailcast_drain_margin_seconds: 10,
            mailcast_transport_retry_attempts: 3,
            mailcast_transport_retry_pause_ms: 0,
            mailcast_dispatcher_invocations: 1,
        }
    }
}
