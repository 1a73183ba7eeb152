//! Scripted reveal of the results screen.
//!
//! The narrative is split into chat messages that are "typed" one character
//! at a time, with a thinking pause between messages. Once every message is
//! out, solar customers get two informational cards while everyone else gets
//! the sales pitch, the question and finally the answer buttons.
//!
//! The whole sequence is a fixed list of milestones computed up front, so any
//! instant can be rendered from the elapsed time alone.

use serde::Serialize;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::{BillRecord, OfferAnswer, Reinforcement, SavingsResult};

/// Literal separator between narrative messages.
pub const NARRATIVE_DELIMITER: &str = "###";

/// Splits the narrative into non-empty, trimmed messages.
pub fn split_narrative(text: &str) -> Vec<String> {
    text.split(NARRATIVE_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Delays driving the reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTiming {
    /// Per character while typing.
    pub typing_interval: Duration,
    /// After a message finishes, before the next one starts.
    pub thinking_pause: Duration,
    /// After the last message, before the sales pitch.
    pub pre_pitch_delay: Duration,
    pub pitch_to_question: Duration,
    pub question_to_options: Duration,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            typing_interval: Duration::from_millis(25),
            thinking_pause: Duration::from_millis(1500),
            pre_pitch_delay: Duration::from_millis(800),
            pitch_to_question: Duration::from_millis(1500),
            question_to_options: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum RevealStage {
    Typing { message: usize },
    Thinking { message: usize },
    Complete,
    SalesPitch,
    Question,
    Options,
}

/// A stage and the offset (from the start of the reveal) at which it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub at: Duration,
    pub stage: RevealStage,
}

/// Informational card shown to distributed-generation customers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "card", rename_all = "snake_case")]
pub enum InfoCard {
    /// Explains the TUSD GD / Fio B fee.
    FeeExplainer,
    ValueReinforcement(Reinforcement),
}

/// Current bill versus the estimated bill under solar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub valor_atual: f64,
    pub nova_conta_estimada: f64,
    pub economia_mensal: f64,
    pub economia_anual: f64,
}

/// What the results screen shows at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevealView {
    pub stage: RevealStage,
    /// Fully typed messages.
    pub messages: Vec<String>,
    /// Partially typed message, while typing.
    pub typing: Option<String>,
    pub thinking: bool,
    pub typing_complete: bool,
    pub info_cards: Vec<InfoCard>,
    pub sales_pitch: Option<Comparison>,
    pub question: bool,
    /// Yes/no buttons; hidden again once answered.
    pub options: bool,
    pub response: Option<OfferAnswer>,
    /// Revealed after "sim"; its CTA leads to the lead form.
    pub comparison: Option<Comparison>,
    pub reset_offered: bool,
    /// Milliseconds until the view changes on its own, if it ever will.
    pub next_change_in_ms: Option<u64>,
}

/// Reveal sequence for one loaded bill.
#[derive(Debug, Clone)]
pub struct RevealTimeline {
    started_at: Duration,
    segments: Vec<String>,
    has_distributed_generation: bool,
    timing: RevealTiming,
    milestones: Vec<Milestone>,
    comparison: Comparison,
    reinforcement: Option<Reinforcement>,
    response: Option<OfferAnswer>,
}

impl RevealTimeline {
    /// Starts a fresh reveal for `bill` at `started_at`.
    pub fn start(
        bill: &BillRecord,
        savings: &SavingsResult,
        reinforcement: Option<Reinforcement>,
        started_at: Duration,
        timing: RevealTiming,
    ) -> Self {
        let segments = bill
            .analise_informal
            .as_deref()
            .map(split_narrative)
            .unwrap_or_default();
        let milestones = build_milestones(&segments, bill.tem_energia_solar, &timing);

        Self {
            started_at,
            segments,
            has_distributed_generation: bill.tem_energia_solar,
            timing,
            milestones,
            comparison: Comparison {
                valor_atual: bill.valor_total.unwrap_or(0.0),
                nova_conta_estimada: savings.nova_conta_estimada,
                economia_mensal: savings.economia_mensal,
                economia_anual: savings.economia_anual,
            },
            reinforcement,
            response: None,
        }
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn response(&self) -> Option<OfferAnswer> {
        self.response
    }

    /// True once the user accepted the offer on a non-solar bill.
    pub fn accepted_offer(&self) -> bool {
        !self.has_distributed_generation && self.response == Some(OfferAnswer::Sim)
    }

    fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started_at)
    }

    fn reached(&self, stage: RevealStage, elapsed: Duration) -> bool {
        self.milestones
            .iter()
            .any(|m| m.stage == stage && m.at <= elapsed)
    }

    /// Records the answer to the simulation prompt.
    pub fn respond(&mut self, answer: OfferAnswer, now: Duration) -> Result<(), AppError> {
        if self.has_distributed_generation {
            return Err(AppError::Conflict(
                "Solar bills are not offered a simulation".to_string(),
            ));
        }
        if self.response.is_some() {
            return Err(AppError::Conflict("Offer already answered".to_string()));
        }
        if !self.reached(RevealStage::Options, self.elapsed(now)) {
            return Err(AppError::Conflict(
                "Answer options are not visible yet".to_string(),
            ));
        }

        tracing::debug!("Simulation offer answered: {:?}", answer);
        self.response = Some(answer);
        Ok(())
    }

    /// Renders the screen at `now`.
    pub fn view_at(&self, now: Duration) -> RevealView {
        let elapsed = self.elapsed(now);
        let position = self.milestones.partition_point(|m| m.at <= elapsed);
        let current = self.milestones[position.saturating_sub(1)];
        let next_milestone = self.milestones.get(position).map(|m| m.at);

        let mut messages = Vec::new();
        let mut typing = None;
        let mut thinking = false;
        let mut next_change = next_milestone;

        match current.stage {
            RevealStage::Typing { message } => {
                messages.extend_from_slice(&self.segments[..message]);
                let interval = self.timing.typing_interval.as_nanos().max(1);
                let typed = ((elapsed - current.at).as_nanos() / interval) as usize;
                typing = Some(self.segments[message].chars().take(typed).collect());
                let next_char = current.at
                    + self
                        .timing
                        .typing_interval
                        .saturating_mul((typed as u32).saturating_add(1));
                next_change = Some(next_milestone.map_or(next_char, |m| m.min(next_char)));
            }
            RevealStage::Thinking { message } => {
                messages.extend_from_slice(&self.segments[..=message]);
                thinking = true;
            }
            _ => messages.extend_from_slice(&self.segments),
        }

        let typing_complete = self.reached(RevealStage::Complete, elapsed);
        let info_cards = if self.has_distributed_generation && typing_complete {
            let mut cards = vec![InfoCard::FeeExplainer];
            if let Some(reinforcement) = self.reinforcement {
                cards.push(InfoCard::ValueReinforcement(reinforcement));
            }
            cards
        } else {
            Vec::new()
        };

        let sales_pitch = self
            .reached(RevealStage::SalesPitch, elapsed)
            .then_some(self.comparison);
        let question = self.reached(RevealStage::Question, elapsed);
        let options = self.reached(RevealStage::Options, elapsed) && self.response.is_none();
        let comparison = (self.response == Some(OfferAnswer::Sim)).then_some(self.comparison);
        let reset_offered = self.response == Some(OfferAnswer::Nao)
            || (self.has_distributed_generation && typing_complete);

        RevealView {
            stage: current.stage,
            messages,
            typing,
            thinking,
            typing_complete,
            info_cards,
            sales_pitch,
            question,
            options,
            response: self.response,
            comparison,
            reset_offered,
            next_change_in_ms: next_change.map(|at| at.saturating_sub(elapsed).as_millis() as u64),
        }
    }
}

fn build_milestones(
    segments: &[String],
    has_distributed_generation: bool,
    timing: &RevealTiming,
) -> Vec<Milestone> {
    let mut milestones = Vec::with_capacity(segments.len() * 2 + 4);
    let mut at = Duration::ZERO;

    for (message, text) in segments.iter().enumerate() {
        milestones.push(Milestone {
            at,
            stage: RevealStage::Typing { message },
        });
        at += timing.typing_interval * text.chars().count() as u32;
        milestones.push(Milestone {
            at,
            stage: RevealStage::Thinking { message },
        });
        at += timing.thinking_pause;
    }

    milestones.push(Milestone {
        at,
        stage: RevealStage::Complete,
    });

    if !has_distributed_generation {
        for (delay, stage) in [
            (timing.pre_pitch_delay, RevealStage::SalesPitch),
            (timing.pitch_to_question, RevealStage::Question),
            (timing.question_to_options, RevealStage::Options),
        ] {
            at += delay;
            milestones.push(Milestone { at, stage });
        }
    }

    milestones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{calculate_solar_savings, reinforcement_estimate};
    use crate::models::MeterReadings;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timeline(bill: &BillRecord, started_at: Duration) -> RevealTimeline {
        let savings = calculate_solar_savings(bill);
        RevealTimeline::start(
            bill,
            &savings,
            reinforcement_estimate(bill),
            started_at,
            RevealTiming::default(),
        )
    }

    fn non_solar_bill() -> BillRecord {
        BillRecord {
            valor_total: Some(320.0),
            consumo_kwh: Some(450.0),
            analise_informal: Some("Olá ### Tudo\n###  ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_narrative() {
        assert_eq!(
            split_narrative(" Oi! ###\n Resumo ### ### Fim "),
            vec!["Oi!", "Resumo", "Fim"]
        );
        assert!(split_narrative("  ###  ").is_empty());
    }

    #[test]
    fn test_milestones_for_non_solar_bill() {
        let t = timeline(&non_solar_bill(), Duration::ZERO);
        let at: Vec<(u128, RevealStage)> = t
            .milestones()
            .iter()
            .map(|m| (m.at.as_millis(), m.stage))
            .collect();

        assert_eq!(
            at,
            vec![
                (0, RevealStage::Typing { message: 0 }),
                (75, RevealStage::Thinking { message: 0 }),
                (1575, RevealStage::Typing { message: 1 }),
                (1675, RevealStage::Thinking { message: 1 }),
                (3175, RevealStage::Complete),
                (3975, RevealStage::SalesPitch),
                (5475, RevealStage::Question),
                (6475, RevealStage::Options),
            ]
        );
    }

    #[test]
    fn test_typing_reveals_one_character_per_interval() {
        let t = timeline(&non_solar_bill(), ms(10_000));

        let view = t.view_at(ms(10_000));
        assert_eq!(view.typing.as_deref(), Some(""));
        assert_eq!(view.next_change_in_ms, Some(25));

        let view = t.view_at(ms(10_050));
        assert_eq!(view.typing.as_deref(), Some("Ol"));
        assert!(view.messages.is_empty());

        let view = t.view_at(ms(10_075));
        assert_eq!(view.typing, None);
        assert!(view.thinking);
        assert_eq!(view.messages, vec!["Olá"]);
        assert_eq!(view.next_change_in_ms, Some(1500));

        let view = t.view_at(ms(11_600));
        assert_eq!(view.typing.as_deref(), Some("T"));
        assert_eq!(view.messages, vec!["Olá"]);
    }

    #[test]
    fn test_zero_typing_interval_shows_messages_whole() {
        let bill = non_solar_bill();
        let savings = calculate_solar_savings(&bill);
        let timing = RevealTiming {
            typing_interval: Duration::ZERO,
            ..Default::default()
        };
        let t = RevealTimeline::start(
            &bill,
            &savings,
            reinforcement_estimate(&bill),
            ms(500),
            timing,
        );

        let view = t.view_at(ms(500));
        assert_eq!(view.typing, None);
        assert!(view.thinking);
        assert_eq!(view.messages, vec!["Olá"]);
        assert_eq!(view.next_change_in_ms, Some(1500));

        let view = t.view_at(ms(2000));
        assert_eq!(view.messages, vec!["Olá", "Tudo"]);
        assert!(t.view_at(ms(60_000)).typing_complete);
    }

    #[test]
    fn test_non_solar_funnel_after_messages() {
        let mut t = timeline(&non_solar_bill(), Duration::ZERO);

        let view = t.view_at(ms(3175));
        assert!(view.typing_complete);
        assert!(view.sales_pitch.is_none());
        assert!(view.info_cards.is_empty());

        let view = t.view_at(ms(3975));
        let pitch = view.sales_pitch.expect("pitch shown");
        assert_eq!(pitch.economia_mensal, 270.0);
        assert!(!view.question);

        assert!(t.respond(OfferAnswer::Sim, ms(6000)).is_err());

        let view = t.view_at(ms(6475));
        assert!(view.question);
        assert!(view.options);
        assert_eq!(view.next_change_in_ms, None);

        t.respond(OfferAnswer::Sim, ms(7000)).unwrap();
        let view = t.view_at(ms(7000));
        assert!(!view.options);
        assert_eq!(view.comparison.map(|c| c.nova_conta_estimada), Some(50.0));
        assert!(!view.reset_offered);
        assert!(t.accepted_offer());

        assert!(t.respond(OfferAnswer::Nao, ms(8000)).is_err());
    }

    #[test]
    fn test_declining_offers_reset() {
        let mut t = timeline(&non_solar_bill(), Duration::ZERO);
        t.respond(OfferAnswer::Nao, ms(7000)).unwrap();

        let view = t.view_at(ms(7000));
        assert!(view.reset_offered);
        assert!(view.comparison.is_none());
        assert!(!t.accepted_offer());
    }

    #[test]
    fn test_solar_bill_shows_cards_and_no_offer() {
        let bill = BillRecord {
            tem_energia_solar: true,
            valor_total: Some(92.3),
            leituras: MeterReadings {
                atual: Some(500.0),
                anterior: Some(300.0),
            },
            analise_informal: Some("Parabéns".to_string()),
            ..Default::default()
        };
        let mut t = timeline(&bill, Duration::ZERO);
        assert_eq!(t.milestones().last().map(|m| m.stage), Some(RevealStage::Complete));

        let view = t.view_at(ms(60_000));
        assert!(view.typing_complete);
        assert!(view.reset_offered);
        assert!(view.sales_pitch.is_none());
        assert_eq!(view.info_cards.len(), 2);
        assert_eq!(view.info_cards[0], InfoCard::FeeExplainer);

        assert!(t.respond(OfferAnswer::Sim, ms(60_000)).is_err());
    }

    #[test]
    fn test_solar_bill_without_reinforcement_shows_only_fee_card() {
        let bill = BillRecord {
            tem_energia_solar: true,
            analise_informal: Some("Parabéns".to_string()),
            ..Default::default()
        };
        let t = timeline(&bill, Duration::ZERO);
        let view = t.view_at(ms(60_000));
        assert_eq!(view.info_cards, vec![InfoCard::FeeExplainer]);
    }

    #[test]
    fn test_empty_narrative_completes_immediately() {
        let bill = BillRecord {
            valor_total: Some(320.0),
            ..Default::default()
        };
        let t = timeline(&bill, ms(500));
        let view = t.view_at(ms(500));
        assert!(view.typing_complete);
        assert!(view.messages.is_empty());
        assert_eq!(view.next_change_in_ms, Some(800));
    }
}
