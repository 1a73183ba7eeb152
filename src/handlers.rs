//! Route handlers and shared application state for the session flow.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cep_client::{RegionLookup, ViaCepClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::AppError;
use crate::estimator::{calculate_solar_savings, reinforcement_estimate};
use crate::gemini_client::{analyze_bill, DocumentIntelligence, GeminiClient};
use crate::lead_capture::{LeadField, ValidationMode};
use crate::models::{BillImage, BillRecord, OfferAnswer, Reinforcement, SavingsResult};
use crate::reveal::RevealTiming;
use crate::session::{Session, SessionSnapshot};
use crate::webhook_client::{EventSink, LoggingEventSink, WebhookNotifier};
use crate::webhook_models::NotificationEvent;

pub type SharedSession = Arc<Mutex<Session>>;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Live sessions, evicted after `session_ttl_secs` without access.
    pub sessions: Cache<Uuid, SharedSession>,
    pub intelligence: Arc<dyn DocumentIntelligence>,
    pub region_lookup: Arc<dyn RegionLookup>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub timing: RevealTiming,
}

impl AppState {
    pub fn new(
        config: Config,
        intelligence: Arc<dyn DocumentIntelligence>,
        region_lookup: Arc<dyn RegionLookup>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(Duration::from_secs(config.session_ttl_secs))
            .max_capacity(100_000)
            .build();

        Self {
            config,
            sessions,
            intelligence,
            region_lookup,
            events,
            clock,
            timing: RevealTiming::default(),
        }
    }

    /// Wires the production clients described by `config`.
    pub fn from_config(config: Config) -> Self {
        let intelligence = Arc::new(GeminiClient::new(
            config.gemini_base_url.clone(),
            config.gemini_model.clone(),
            config.gemini_api_key.clone(),
        ));
        let region_lookup = Arc::new(ViaCepClient::new(config.viacep_base_url.clone()));
        let events: Arc<dyn EventSink> = match config.webhook_url.clone() {
            Some(url) => {
                tracing::info!("✓ Webhook notifier initialized");
                Arc::new(WebhookNotifier::new(url))
            }
            None => Arc::new(LoggingEventSink),
        };

        Self::new(
            config,
            intelligence,
            region_lookup,
            events,
            Arc::new(SystemClock::new()),
        )
    }

    fn validation_mode(&self) -> ValidationMode {
        if self.config.lead_form_strict {
            ValidationMode::Strict
        } else {
            ValidationMode::Lenient
        }
    }

    async fn session(&self, id: Uuid) -> Result<SharedSession, AppError> {
        self.sessions
            .get(&id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    async fn snapshot(&self, session: &SharedSession) -> SessionSnapshot {
        session.lock().await.snapshot(self.clock.now())
    }

    /// Looks up `cep_digits` outside the session lock and stores the outcome.
    async fn resolve_region(&self, session: &SharedSession, epoch: u64, cep_digits: String) {
        let outcome = match self.region_lookup.lookup_region(&cep_digits).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("Region lookup failed for CEP {}: {}", cep_digits, e);
                None
            }
        };
        session
            .lock()
            .await
            .apply_region_lookup(epoch, &cep_digits, outcome);
    }
}

// ============ Request / Response types ============

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub savings: SavingsResult,
    pub reinforcement: Option<Reinforcement>,
}

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub answer: OfferAnswer,
}

#[derive(Debug, Deserialize)]
pub struct LeadFieldUpdate {
    pub field: LeadField,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct LeadSubmitResponse {
    pub session: SessionSnapshot,
    /// Normalized WhatsApp number, when it is a valid BR number.
    pub whatsapp_e164: Option<String>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "conta-explicada-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/estimate
///
/// Stateless savings estimate for an already extracted bill.
pub async fn estimate(Json(bill): Json<BillRecord>) -> Json<EstimateResponse> {
    Json(EstimateResponse {
        savings: calculate_solar_savings(&bill),
        reinforcement: reinforcement_estimate(&bill),
    })
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let session = Session::new(state.validation_mode(), state.timing);
    let id = session.id;
    let snapshot = session.snapshot(state.clock.now());
    state
        .sessions
        .insert(id, Arc::new(Mutex::new(session)))
        .await;

    tracing::info!("Session {} created", id);
    (StatusCode::CREATED, Json(snapshot))
}

/// GET /api/v1/sessions/:id
///
/// The reveal view is computed at request time; clients poll using
/// `reveal.next_change_in_ms`.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;
    Ok(Json(state.snapshot(&session).await))
}

/// POST /api/v1/sessions/:id/bill
///
/// Accepts the bill as the multipart field `file`, runs extraction and the
/// narrative, notifies the webhook and moves to the results screen. Any
/// failure sends the session back to upload with an alert.
pub async fn upload_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;
    let image = read_bill_image(&mut multipart).await?;

    let epoch = session.lock().await.begin_processing()?;
    tracing::info!("Session {}: analyzing bill ({} bytes)", id, image.bytes.len());

    match analyze_bill(state.intelligence.as_ref(), &image).await {
        Ok(bill) => {
            state
                .events
                .notify(NotificationEvent::analysis_complete(&bill))
                .await;

            let mut guard = session.lock().await;
            guard.complete_extraction(epoch, bill, state.clock.now())?;
            Ok(Json(guard.snapshot(state.clock.now())))
        }
        Err(e) => {
            tracing::error!("Session {}: bill analysis failed: {}", id, e);
            let message = e.user_message();
            session
                .lock()
                .await
                .fail_extraction(epoch, message.clone())?;
            Err(AppError::Extraction(message))
        }
    }
}

async fn read_bill_image(multipart: &mut Multipart) -> Result<BillImage, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let mime_type = field
            .content_type()
            .map(str::to_string)
            .filter(|m| m != "application/octet-stream")
            .or_else(|| {
                field
                    .file_name()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read uploaded file: {}", e)))?;

        return Ok(BillImage::new(mime_type, bytes.to_vec()));
    }

    Err(AppError::BadRequest(
        "Multipart field 'file' is required".to_string(),
    ))
}

/// POST /api/v1/sessions/:id/offer
pub async fn answer_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<OfferRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;
    let now = state.clock.now();

    let mut guard = session.lock().await;
    guard.respond_to_offer(request.answer, now)?;
    Ok(Json(guard.snapshot(now)))
}

/// POST /api/v1/sessions/:id/lead-capture
///
/// Opens the lead form. The opt-in notification is fire-and-forget; the
/// pre-seeded CEP is resolved before responding.
pub async fn open_lead_capture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;
    let start = session.lock().await.continue_to_lead()?;

    let events = state.events.clone();
    let event = NotificationEvent::simulation_requested(Some(&start.bill));
    tokio::spawn(async move {
        events.notify(event).await;
    });

    if let Some(cep_digits) = start.lookup {
        state.resolve_region(&session, start.epoch, cep_digits).await;
    }

    Ok(Json(state.snapshot(&session).await))
}

/// PATCH /api/v1/sessions/:id/lead
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<LeadFieldUpdate>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;

    let (epoch, lookup) = {
        let mut guard = session.lock().await;
        let lookup = guard.update_lead_field(update.field, &update.value)?;
        (guard.epoch(), lookup)
    };

    if let Some(cep_digits) = lookup {
        state.resolve_region(&session, epoch, cep_digits).await;
    }

    Ok(Json(state.snapshot(&session).await))
}

/// POST /api/v1/sessions/:id/lead/submit
///
/// Validates the form, waits for the lead notification, then shows success.
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadSubmitResponse>, AppError> {
    let session = state.session(id).await?;
    let pending = session.lock().await.begin_submit()?;

    state
        .events
        .notify(NotificationEvent::lead_submitted(
            pending.bill.as_ref(),
            &pending.lead,
        ))
        .await;

    let mut guard = session.lock().await;
    guard.finish_submit(pending.epoch)?;
    tracing::info!("Session {}: lead submitted", id);

    Ok(Json(LeadSubmitResponse {
        session: guard.snapshot(state.clock.now()),
        whatsapp_e164: pending.lead.whatsapp_e164(),
    }))
}

/// POST /api/v1/sessions/:id/reset
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id).await?;
    let mut guard = session.lock().await;
    guard.reset();
    Ok(Json(guard.snapshot(state.clock.now())))
}
