use async_trait::async_trait;

use crate::circuit_breaker::{create_webhook_circuit_breaker, WebhookCircuitBreaker};
use crate::errors::AppError;
use crate::webhook_models::NotificationEvent;

/// Best-effort destination for funnel events.
///
/// `notify` never fails from the caller's point of view: delivery problems are
/// logged and swallowed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Posts events as JSON to the configured webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    breaker: WebhookCircuitBreaker,
}

impl WebhookNotifier {
    /// Creates a new `WebhookNotifier`.
    ///
    /// No request timeout is set here; the transport defaults apply.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            breaker: create_webhook_circuit_breaker(),
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), AppError> {
        let payload = event.to_payload();

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Webhook returned {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for WebhookNotifier {
    /// Every event is posted, even while the breaker is open; the breaker only
    /// tracks whether the endpoint is currently failing.
    async fn notify(&self, event: NotificationEvent) {
        if !self.breaker.is_call_permitted() {
            tracing::warn!(
                "Webhook endpoint has been failing, sending '{}' anyway",
                event.title
            );
        }

        match self.deliver(&event).await {
            Ok(()) => {
                self.breaker.on_success();
                tracing::info!("✓ Webhook event delivered: {}", event.title);
            }
            Err(e) => {
                self.breaker.on_error();
                tracing::error!("Failed to send event '{}' to webhook: {}", event.title, e);
            }
        }
    }
}

/// Sink used when no webhook URL is configured: events are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn notify(&self, event: NotificationEvent) {
        let payload = event.to_payload();
        tracing::info!(
            "Webhook disabled; event {} (titular: {})",
            payload.evento,
            payload.nome_titular
        );
    }
}
