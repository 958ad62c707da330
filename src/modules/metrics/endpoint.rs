// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use poem::{
    http::{Method, StatusCode},
    listener::TcpListener,
    middleware::CatchPanic,
    EndpointExt, Endpoint, Request, Response, Result, Route, Server,
};
use prometheus::{default_registry, Encoder, TextEncoder};

use crate::{
    modules::{
        common::signal::SIGNAL_MANAGER,
        error::{code::ErrorCode, MailcastResult},
        settings::cli::SETTINGS,
    },
    raise_error,
};

pub struct PrometheusEndpoint;

impl Endpoint for PrometheusEndpoint {
    type Output = Response;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        if req.method() != Method::GET {
            return Ok(StatusCode::METHOD_NOT_ALLOWED.into());
        }
        let encoder = TextEncoder::new();
        let metric_families = default_registry().gather();
        let mut result = Vec::new();
        match encoder.encode(&metric_families, &mut result) {
            Ok(()) => Ok(Response::builder()
                .content_type(encoder.format_type())
                .body(result)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR.into()),
        }
    }
}

pub async fn start_metrics_server() -> MailcastResult<()> {
    let listener = TcpListener::bind((
        SETTINGS.mailcast_bind_ip.clone(),
        SETTINGS.mailcast_http_port,
    ));

    let route = Route::new()
        .nest("/metrics", PrometheusEndpoint)
        .with(CatchPanic::new());

    let mut shutdown = SIGNAL_MANAGER.subscribe();
    let server = Server::new(listener)
        .name("mailcast metrics")
        .idle_timeout(Duration::from_secs(60))
        .run_with_graceful_shutdown(
            route,
            async move {
                let _ = shutdown.recv().await;
            },
            Some(Duration::from_secs(5)),
        );
    tracing::info!(
        "Metrics endpoint is listening on {}:{}/metrics",
        SETTINGS.mailcast_bind_ip,
        SETTINGS.mailcast_http_port
    );
    server
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::test::TestClient;

    #[tokio::test]
    async fn metrics_are_rendered_in_text_format() {
        crate::modules::metrics::CAMPAIGN_EMAILS_PROCESSED.inc();
        let client = TestClient::new(Route::new().nest("/metrics", PrometheusEndpoint));
        let resp = client.get("/metrics").send().await;
        resp.assert_status_is_ok();
        let body = resp.0.into_body().into_string().await.unwrap();
        assert!(body.contains("campaign_emails_processed_total"));
    }

    #[tokio::test]
    async fn rejects_non_get_requests() {
        let client = TestClient::new(Route::new().nest("/metrics", PrometheusEndpoint));
        let resp = client.post("/metrics").send().await;
        resp.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }
}
