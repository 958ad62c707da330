// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::logger::LocalTimer;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

pub static LOG_WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn setup_file_logger(level: Level) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (worker_nonb, worker_guard) = worker_log_writer()?;
    // A second call keeps the first guard alive.
    let _ = LOG_WORKER_GUARD.set(worker_guard);

    let worker_layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_ansi(SETTINGS.mailcast_ansi_logs)
        .with_level(true)
        .with_writer(worker_nonb)
        .with_target(true);

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(worker_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn worker_log_writer(
) -> Result<(NonBlocking, WorkerGuard), tracing_appender::rolling::InitError> {
    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("worker")
        .max_log_files(SETTINGS.mailcast_max_server_log_files)
        .build(DATA_DIR_MANAGER.log_dir.clone())?;
    Ok(tracing_appender::non_blocking(rolling))
}
