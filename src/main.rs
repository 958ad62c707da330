// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use mimalloc::MiMalloc;
use modules::{
    campaign::store::NativeCampaignStore,
    common::{rustls::MailcastTls, signal::SignalManager},
    context::Initialize,
    database::manager::DatabaseManager,
    delivery::attachment::DiskAttachmentStore,
    error::{code::ErrorCode, MailcastResult},
    logger,
    metrics::{endpoint::start_metrics_server, MetricsService},
    queue::native::NativeDbQueue,
    settings::{cli::SETTINGS, dir::DataDirManager},
    smtp::executor::SmtpTransport,
    worker::{
        runner::{Dispatcher, DispatcherConfig},
        CampaignWorker, WorkerOptions,
    },
};
use tracing::{error, info};

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> MailcastResult<()> {
    logger::initialize_logging();
    info!("Starting mailcast worker");
    info!("Version:  {}", mailcast_version!());
    info!("Git:      [{}]", env!("GIT_HASH"));

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    run().await
}

/// Validate settings and bring up shared resources.
async fn initialize() -> MailcastResult<()> {
    SETTINGS.validate()?;
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    MetricsService::initialize().await?;
    DatabaseManager::initialize().await?;
    MailcastTls::initialize().await?;
    Ok(())
}

async fn run() -> MailcastResult<()> {
    let metrics_server = tokio::spawn(async move {
        let result = start_metrics_server().await;
        if let Err(e) = &result {
            error!("Failed to start metrics server: {}", e);
        }
        result
    });

    let worker = CampaignWorker::new(
        Arc::new(NativeCampaignStore::from_manager()),
        Arc::new(SmtpTransport::from_settings()),
        Arc::new(DiskAttachmentStore::init()),
        WorkerOptions::from_settings(&SETTINGS),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(NativeDbQueue::from_manager()),
        Arc::new(worker),
        DispatcherConfig::from_settings(&SETTINGS),
    ));
    info!(
        "Relaying through {}:{} ({}), {} dispatcher(s)",
        SETTINGS.mailcast_smtp_host,
        SETTINGS.mailcast_smtp_port,
        SETTINGS.mailcast_smtp_encryption,
        SETTINGS.mailcast_dispatcher_invocations
    );

    let dispatchers = dispatcher.start(SETTINGS.mailcast_dispatcher_invocations);
    futures::future::try_join_all(dispatchers)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

    metrics_server
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))??;
    info!("All dispatchers stopped, bye");
    Ok(())
}
