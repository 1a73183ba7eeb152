use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::models::{BillRecord, LeadRecord};

pub const TITLE_SIMULATION_REQUESTED: &str =
    "Usuário clicou em: 'Sim, quero a simulação completa'";
pub const TITLE_LEAD_SUBMITTED: &str = "Novo Lead Qualificado (Formulário Preenchido)";

const UNKNOWN_BILL_VALUE: &str = "Não identificado";
const UNKNOWN_LEAD_VALUE: &str = "N/A";

/// A funnel event forwarded to the notification webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub title: String,
    pub bill: Option<BillRecord>,
    pub lead: Option<LeadRecord>,
}

impl NotificationEvent {
    /// Bill extraction succeeded.
    pub fn analysis_complete(bill: &BillRecord) -> Self {
        let titular = bill
            .nome_titular
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Titular não encontrado");
        Self {
            title: format!("Análise Concluída: {}", titular),
            bill: Some(bill.clone()),
            lead: None,
        }
    }

    /// The user opted into the full simulation.
    pub fn simulation_requested(bill: Option<&BillRecord>) -> Self {
        Self {
            title: TITLE_SIMULATION_REQUESTED.to_string(),
            bill: bill.cloned(),
            lead: None,
        }
    }

    /// The lead form was submitted.
    pub fn lead_submitted(bill: Option<&BillRecord>, lead: &LeadRecord) -> Self {
        Self {
            title: TITLE_LEAD_SUBMITTED.to_string(),
            bill: bill.cloned(),
            lead: Some(lead.clone()),
        }
    }

    pub fn to_payload(&self) -> WebhookPayload {
        let bill = self.bill.as_ref();
        let lead = self.lead.as_ref();
        WebhookPayload {
            titulo_notificacao: self.title.clone(),
            evento: event_name(&self.title),
            nome_titular: or_placeholder(
                bill.and_then(|b| b.nome_titular.as_deref()),
                UNKNOWN_BILL_VALUE,
            ),
            nome_completo: or_placeholder(lead.map(|l| l.nome.as_str()), UNKNOWN_LEAD_VALUE),
            whatsapp: or_placeholder(lead.map(|l| l.whatsapp.as_str()), UNKNOWN_LEAD_VALUE),
            cep: or_placeholder(lead.map(|l| l.cep.as_str()), UNKNOWN_LEAD_VALUE),
            uf: or_placeholder(lead.map(|l| l.estado.as_str()), UNKNOWN_LEAD_VALUE),
            valor_conta: format_brl(bill.and_then(|b| b.valor_total)),
            referencia_conta: or_placeholder(
                bill.and_then(|b| b.mes_referencia.as_deref()),
                UNKNOWN_BILL_VALUE,
            ),
            consumo_kwh: format_kwh(bill.and_then(|b| b.consumo_kwh)),
        }
    }
}

/// JSON body posted to the notification webhook. Keys are fixed by the receiving automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub titulo_notificacao: String,
    pub evento: String,
    #[serde(rename = "Nome do Titular")]
    pub nome_titular: String,
    #[serde(rename = "Nome completo")]
    pub nome_completo: String,
    pub whatsapp: String,
    pub cep: String,
    #[serde(rename = "UF")]
    pub uf: String,
    #[serde(rename = "valor da conta")]
    pub valor_conta: String,
    #[serde(rename = "referencia das conta")]
    pub referencia_conta: String,
    #[serde(rename = "consumo em kwh da conta")]
    pub consumo_kwh: String,
}

fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or(placeholder)
        .to_string()
}

/// Upper-cased title with whitespace runs replaced by `_`.
pub fn event_name(title: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    re.replace_all(title, "_").to_uppercase()
}

/// `R$ 1234,50`; absent or zero amounts read `R$ 0,00`.
pub fn format_brl(value: Option<f64>) -> String {
    match value.filter(|v| *v != 0.0 && v.is_finite()) {
        Some(v) => format!("R$ {:.2}", v).replace('.', ","),
        None => "R$ 0,00".to_string(),
    }
}

/// `450kwh`; absent or zero consumption reads `0kwh`.
pub fn format_kwh(value: Option<f64>) -> String {
    match value.filter(|v| *v != 0.0 && v.is_finite()) {
        Some(v) => format!("{}kwh", v),
        None => "0kwh".to_string(),
    }
}
