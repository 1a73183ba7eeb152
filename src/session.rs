//! Per-visitor screen sequencer.
//!
//! A [`Session`] owns everything one visitor produces between two resets:
//! the extracted bill, the derived savings, the reveal timeline and the lead
//! form. Handlers drive it through explicit transitions; network calls happen
//! outside the session lock and report back with the epoch they started in,
//! so results from before a reset are discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::cep_client::RegionLookupOutcome;
use crate::errors::AppError;
use crate::estimator::{calculate_solar_savings, reinforcement_estimate};
use crate::lead_capture::{LeadField, LeadForm, ValidationMode};
use crate::models::{AppStep, BillRecord, LeadRecord, OfferAnswer, Reinforcement, SavingsResult};
use crate::reveal::{RevealTimeline, RevealTiming, RevealView};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    step: AppStep,
    epoch: u64,
    bill: Option<BillRecord>,
    savings: Option<SavingsResult>,
    reinforcement: Option<Reinforcement>,
    timeline: Option<RevealTimeline>,
    lead_form: Option<LeadForm>,
    lead: Option<LeadRecord>,
    is_submitting: bool,
    alert: Option<String>,
    mode: ValidationMode,
    timing: RevealTiming,
}

/// What the client renders for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub step: AppStep,
    pub alert: Option<String>,
    pub bill: Option<BillRecord>,
    pub savings: Option<SavingsResult>,
    pub reveal: Option<RevealView>,
    pub lead_form: Option<LeadForm>,
    pub lead: Option<LeadRecord>,
    pub is_submitting: bool,
}

/// Data needed to send a lead once validation passed.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub epoch: u64,
    pub lead: LeadRecord,
    pub bill: Option<BillRecord>,
}

/// Result of opening the lead form.
#[derive(Debug, Clone)]
pub struct LeadCaptureStart {
    pub epoch: u64,
    pub bill: BillRecord,
    /// Postal code digits to look up, when the pre-seeded CEP is complete.
    pub lookup: Option<String>,
}

impl Session {
    pub fn new(mode: ValidationMode, timing: RevealTiming) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            step: AppStep::Upload,
            epoch: 0,
            bill: None,
            savings: None,
            reinforcement: None,
            timeline: None,
            lead_form: None,
            lead: None,
            is_submitting: false,
            alert: None,
            mode,
            timing,
        }
    }

    pub fn step(&self) -> AppStep {
        self.step
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bill(&self) -> Option<&BillRecord> {
        self.bill.as_ref()
    }

    pub fn lead_form(&self) -> Option<&LeadForm> {
        self.lead_form.as_ref()
    }

    fn transition(&mut self, to: AppStep) -> Result<(), AppError> {
        if !self.step.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "Cannot move from {:?} to {:?}",
                self.step, to
            )));
        }
        tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.step, to);
        self.step = to;
        Ok(())
    }

    fn require_step(&self, expected: AppStep) -> Result<(), AppError> {
        if self.step != expected {
            return Err(AppError::Conflict(format!(
                "Session is at {:?}, expected {:?}",
                self.step, expected
            )));
        }
        Ok(())
    }

    fn check_epoch(&self, epoch: u64) -> Result<(), AppError> {
        if epoch != self.epoch {
            tracing::info!(
                "Session {}: discarding result from epoch {} (now {})",
                self.id,
                epoch,
                self.epoch
            );
            return Err(AppError::Conflict(
                "Session was reset while the operation was running".to_string(),
            ));
        }
        Ok(())
    }

    /// A file was selected: `UPLOAD -> PROCESSING`. Returns the current epoch.
    pub fn begin_processing(&mut self) -> Result<u64, AppError> {
        self.transition(AppStep::Processing)?;
        self.alert = None;
        Ok(self.epoch)
    }

    /// Extraction succeeded: `PROCESSING -> RESULTS` with a fresh reveal.
    pub fn complete_extraction(
        &mut self,
        epoch: u64,
        bill: BillRecord,
        now: Duration,
    ) -> Result<(), AppError> {
        self.check_epoch(epoch)?;
        self.transition(AppStep::Results)?;

        let savings = calculate_solar_savings(&bill);
        let reinforcement = reinforcement_estimate(&bill);
        self.timeline = Some(RevealTimeline::start(
            &bill,
            &savings,
            reinforcement,
            now,
            self.timing,
        ));
        self.savings = Some(savings);
        self.reinforcement = reinforcement;
        self.bill = Some(bill);
        Ok(())
    }

    /// Extraction failed: back to `UPLOAD` with an alert.
    pub fn fail_extraction(&mut self, epoch: u64, message: impl Into<String>) -> Result<(), AppError> {
        self.check_epoch(epoch)?;
        self.transition(AppStep::Upload)?;
        self.alert = Some(message.into());
        Ok(())
    }

    /// Answers the simulation offer on the results screen.
    pub fn respond_to_offer(&mut self, answer: OfferAnswer, now: Duration) -> Result<(), AppError> {
        self.require_step(AppStep::Results)?;
        let timeline = self
            .timeline
            .as_mut()
            .ok_or_else(|| AppError::InternalError("Results without a timeline".to_string()))?;
        timeline.respond(answer, now)
    }

    /// Comparison card CTA: `RESULTS -> LEAD_CAPTURE`.
    ///
    /// Opens the lead form pre-seeded with the bill's titular and postal code.
    pub fn continue_to_lead(&mut self) -> Result<LeadCaptureStart, AppError> {
        self.require_step(AppStep::Results)?;
        let accepted = self
            .timeline
            .as_ref()
            .map(RevealTimeline::accepted_offer)
            .unwrap_or(false);
        if !accepted {
            return Err(AppError::Conflict(
                "The simulation offer has not been accepted".to_string(),
            ));
        }
        let bill = self
            .bill
            .clone()
            .ok_or_else(|| AppError::InternalError("Results without a bill".to_string()))?;

        self.transition(AppStep::LeadCapture)?;

        let mut form = LeadForm::new(self.mode);
        if let Some(nome) = bill.nome_titular.as_deref() {
            form.update(LeadField::Nome, nome);
        }
        let lookup = bill
            .cep
            .as_deref()
            .and_then(|cep| form.update(LeadField::Cep, cep));
        self.lead_form = Some(form);

        Ok(LeadCaptureStart {
            epoch: self.epoch,
            bill,
            lookup,
        })
    }

    /// Edits one lead form field. Returns CEP digits to look up, if any.
    pub fn update_lead_field(&mut self, field: LeadField, value: &str) -> Result<Option<String>, AppError> {
        self.require_step(AppStep::LeadCapture)?;
        if self.is_submitting {
            return Err(AppError::Conflict("Lead is being submitted".to_string()));
        }
        let form = self
            .lead_form
            .as_mut()
            .ok_or_else(|| AppError::InternalError("Lead capture without a form".to_string()))?;
        Ok(form.update(field, value))
    }

    /// Stores a region lookup result. Results from an older epoch or step are dropped.
    pub fn apply_region_lookup(
        &mut self,
        epoch: u64,
        cep_digits: &str,
        outcome: Option<RegionLookupOutcome>,
    ) {
        if epoch != self.epoch || self.step != AppStep::LeadCapture {
            tracing::debug!("Session {}: dropping region lookup for {}", self.id, cep_digits);
            return;
        }
        if let Some(form) = self.lead_form.as_mut() {
            form.apply_region_lookup(cep_digits, outcome);
        }
    }

    /// Validates the lead form and marks the submission in flight.
    pub fn begin_submit(&mut self) -> Result<PendingSubmission, AppError> {
        self.require_step(AppStep::LeadCapture)?;
        if self.is_submitting {
            return Err(AppError::Conflict("Lead is already being submitted".to_string()));
        }
        let form = self
            .lead_form
            .as_mut()
            .ok_or_else(|| AppError::InternalError("Lead capture without a form".to_string()))?;

        let lead = form.validate().map_err(AppError::Validation)?;
        self.is_submitting = true;
        self.lead = Some(lead.clone());

        Ok(PendingSubmission {
            epoch: self.epoch,
            lead,
            bill: self.bill.clone(),
        })
    }

    /// The lead notification finished: `LEAD_CAPTURE -> SUCCESS`.
    pub fn finish_submit(&mut self, epoch: u64) -> Result<(), AppError> {
        self.check_epoch(epoch)?;
        self.is_submitting = false;
        self.transition(AppStep::Success)
    }

    /// Clears everything and returns to `UPLOAD`, from any step.
    pub fn reset(&mut self) {
        tracing::info!("Session {} reset from {:?}", self.id, self.step);
        let epoch = self.epoch + 1;
        *self = Self {
            id: self.id,
            created_at: self.created_at,
            epoch,
            ..Self::new(self.mode, self.timing)
        };
    }

    pub fn snapshot(&self, now: Duration) -> SessionSnapshot {
        let reveal = match self.step {
            AppStep::Results => self.timeline.as_ref().map(|t| t.view_at(now)),
            _ => None,
        };

        SessionSnapshot {
            id: self.id,
            step: self.step,
            alert: self.alert.clone(),
            bill: self.bill.clone(),
            savings: self.savings,
            reveal,
            lead_form: self.lead_form.clone(),
            lead: self.lead.clone(),
            is_submitting: self.is_submitting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead_capture::CEP_NOT_FOUND;

    fn bill(solar: bool) -> BillRecord {
        BillRecord {
            nome_titular: Some("Maria Souza".to_string()),
            cep: Some("01310100".to_string()),
            consumo_kwh: Some(450.0),
            valor_total: Some(320.0),
            tem_energia_solar: solar,
            analise_informal: Some("Oi###Tudo certo".to_string()),
            ..Default::default()
        }
    }

    fn session() -> Session {
        Session::new(ValidationMode::Strict, RevealTiming::default())
    }

    /// Drives a non-solar session until the options are visible.
    fn at_results(s: &mut Session) -> Duration {
        let epoch = s.begin_processing().unwrap();
        s.complete_extraction(epoch, bill(false), Duration::ZERO).unwrap();
        Duration::from_secs(60)
    }

    #[test]
    fn test_happy_path_to_success() {
        let mut s = session();
        let later = at_results(&mut s);
        s.respond_to_offer(OfferAnswer::Sim, later).unwrap();

        let start = s.continue_to_lead().unwrap();
        assert_eq!(start.lookup.as_deref(), Some("01310100"));
        assert_eq!(s.step(), AppStep::LeadCapture);
        let form = s.lead_form().unwrap();
        assert_eq!(form.nome, "Maria Souza");
        assert_eq!(form.cep, "01310-100");

        s.apply_region_lookup(start.epoch, "01310100", Some(RegionLookupOutcome::Found("SP".into())));
        s.update_lead_field(LeadField::Whatsapp, "11999998888").unwrap();

        let pending = s.begin_submit().unwrap();
        assert_eq!(pending.lead.estado, "SP");
        assert_eq!(pending.lead.whatsapp, "(11) 99999-8888");
        assert!(matches!(s.begin_submit(), Err(AppError::Conflict(_))));

        s.finish_submit(pending.epoch).unwrap();
        assert_eq!(s.step(), AppStep::Success);
        assert!(!s.snapshot(later).is_submitting);
    }

    #[test]
    fn test_illegal_transitions_leave_session_untouched() {
        let mut s = session();
        assert!(matches!(s.continue_to_lead(), Err(AppError::Conflict(_))));
        assert!(matches!(s.begin_submit(), Err(AppError::Conflict(_))));

        s.begin_processing().unwrap();
        assert!(matches!(s.begin_processing(), Err(AppError::Conflict(_))));
        assert_eq!(s.step(), AppStep::Processing);
    }

    #[test]
    fn test_extraction_failure_returns_to_upload_with_alert() {
        let mut s = session();
        let epoch = s.begin_processing().unwrap();
        s.fail_extraction(epoch, "A IA retornou uma resposta vazia.").unwrap();

        let snap = s.snapshot(Duration::ZERO);
        assert_eq!(snap.step, AppStep::Upload);
        assert_eq!(snap.alert.as_deref(), Some("A IA retornou uma resposta vazia."));

        s.begin_processing().unwrap();
        assert!(s.snapshot(Duration::ZERO).alert.is_none());
    }

    #[test]
    fn test_solar_bill_cannot_reach_lead_capture() {
        let mut s = session();
        let epoch = s.begin_processing().unwrap();
        s.complete_extraction(epoch, bill(true), Duration::ZERO).unwrap();

        let later = Duration::from_secs(60);
        assert!(s.respond_to_offer(OfferAnswer::Sim, later).is_err());
        assert!(s.continue_to_lead().is_err());
        let view = s.snapshot(later).reveal.unwrap();
        assert!(view.reset_offered);
    }

    #[test]
    fn test_declined_offer_blocks_lead_capture() {
        let mut s = session();
        let later = at_results(&mut s);
        s.respond_to_offer(OfferAnswer::Nao, later).unwrap();
        assert!(matches!(s.continue_to_lead(), Err(AppError::Conflict(_))));
        assert!(s.snapshot(later).reveal.unwrap().reset_offered);
    }

    #[test]
    fn test_reset_equals_fresh_session() {
        let mut s = session();
        let later = at_results(&mut s);
        s.respond_to_offer(OfferAnswer::Sim, later).unwrap();
        s.continue_to_lead().unwrap();
        s.update_lead_field(LeadField::Nome, "Outra Pessoa").unwrap();

        s.reset();

        let mut fresh = session();
        fresh.id = s.id;
        assert_eq!(s.snapshot(later), fresh.snapshot(later));
        assert_eq!(s.epoch(), 1);
    }

    #[test]
    fn test_results_after_reset_are_discarded() {
        let mut s = session();
        let epoch = s.begin_processing().unwrap();
        s.reset();

        assert!(s.complete_extraction(epoch, bill(false), Duration::ZERO).is_err());
        assert_eq!(s.step(), AppStep::Upload);
        assert!(s.bill().is_none());
    }

    #[test]
    fn test_stale_region_lookup_is_dropped() {
        let mut s = session();
        let later = at_results(&mut s);
        s.respond_to_offer(OfferAnswer::Sim, later).unwrap();
        let start = s.continue_to_lead().unwrap();

        s.update_lead_field(LeadField::Cep, "20040").unwrap();
        s.apply_region_lookup(start.epoch, "01310100", Some(RegionLookupOutcome::NotFound));
        assert!(s.lead_form().unwrap().errors.is_empty());

        let digits = s.update_lead_field(LeadField::Cep, "20040002").unwrap().unwrap();
        s.apply_region_lookup(start.epoch, &digits, Some(RegionLookupOutcome::NotFound));
        assert_eq!(
            s.lead_form().unwrap().errors.get(LeadField::Cep),
            Some(CEP_NOT_FOUND)
        );
    }

    #[test]
    fn test_invalid_lead_is_rejected_with_field_errors() {
        let mut s = session();
        let later = at_results(&mut s);
        s.respond_to_offer(OfferAnswer::Sim, later).unwrap();
        s.continue_to_lead().unwrap();
        s.update_lead_field(LeadField::Nome, "  ").unwrap();

        match s.begin_submit() {
            Err(AppError::Validation(errors)) => {
                assert!(errors.get(LeadField::Nome).is_some());
                assert!(errors.get(LeadField::Whatsapp).is_some());
                assert!(errors.get(LeadField::Cep).is_none());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(!s.snapshot(later).is_submitting);
    }
}
