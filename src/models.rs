use serde::{Deserialize, Serialize};

// ============ Extraction Models ============

/// Structured fields read from an electricity bill.
///
/// Field names mirror the extraction schema sent to the document intelligence
/// service. Every optional field means "not found on the bill", which is not
/// the same as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    /// Full name of the account holder.
    #[serde(default)]
    pub nome_titular: Option<String>,
    /// Reference month (e.g. "10/2025").
    #[serde(default)]
    pub mes_referencia: Option<String>,
    /// Billed consumption in kWh (after credits are offset).
    #[serde(default)]
    pub consumo_kwh: Option<f64>,
    /// Total amount due, in BRL.
    #[serde(default)]
    pub valor_total: Option<f64>,
    /// Postal code printed on the bill.
    #[serde(default)]
    pub cep: Option<String>,
    /// Energy tariff (TE) amount.
    #[serde(default)]
    pub te: Option<f64>,
    /// Distribution-use tariff (TUSD) amount.
    #[serde(default)]
    pub tusd: Option<f64>,
    /// Tariff flag colour ("bandeira").
    #[serde(default)]
    pub bandeira: Option<String>,
    /// True when the bill shows distributed generation credits.
    #[serde(default)]
    pub tem_energia_solar: bool,
    /// Injected/offset energy in kWh.
    #[serde(default)]
    pub energia_injetada: Option<f64>,
    /// Accumulated credit balance in kWh.
    #[serde(default)]
    pub saldo_acumulado: Option<f64>,
    /// Fio B / TUSD GD fee, in BRL.
    #[serde(default)]
    pub tusd_gd: Option<f64>,
    /// Meter reading pair.
    #[serde(default)]
    pub leituras: MeterReadings,
    /// Monthly consumption history, oldest first as printed.
    #[serde(default)]
    pub historico: Vec<ConsumptionEntry>,
    /// Tax breakdown.
    #[serde(default)]
    pub impostos: TaxBreakdown,
    /// Other charges.
    #[serde(default)]
    pub outros_itens: OtherCharges,
    /// Narrative explanation, segments separated by `###`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analise_informal: Option<String>,
}

impl BillRecord {
    /// Fields the extraction schema marks as required.
    pub const REQUIRED_FIELDS: [&'static str; 5] = [
        "consumo_kwh",
        "valor_total",
        "tem_energia_solar",
        "nome_titular",
        "cep",
    ];

    /// Real household consumption (`atual - anterior`) when both readings are known.
    pub fn consumo_real(&self) -> Option<f64> {
        match (self.leituras.atual, self.leituras.anterior) {
            (Some(atual), Some(anterior)) => Some(atual - anterior),
            _ => None,
        }
    }

    /// Public lighting charge, if printed on the bill.
    pub fn iluminacao_publica(&self) -> Option<f64> {
        self.outros_itens.iluminacao_publica
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    #[serde(default)]
    pub atual: Option<f64>,
    #[serde(default)]
    pub anterior: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    #[serde(default)]
    pub mes: String,
    #[serde(default)]
    pub consumo_kwh: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    #[serde(default)]
    pub icms: Option<f64>,
    #[serde(default)]
    pub pis: Option<f64>,
    #[serde(default)]
    pub cofins: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherCharges {
    #[serde(default)]
    pub iluminacao_publica: Option<f64>,
    #[serde(default)]
    pub energia_reativa: Option<f64>,
}

// ============ Derived Models ============

/// Solar savings estimate derived from a [`BillRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavingsResult {
    pub economia_mensal: f64,
    pub economia_anual: f64,
    pub economia_5anos: f64,
    pub economia_25anos: f64,
    pub tamanho_sistema_kwp: f64,
    pub nova_conta_estimada: f64,
}

/// Value-reinforcement figures shown to customers who already generate solar energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reinforcement {
    /// Real consumption in kWh (`atual - anterior`).
    pub consumo_real: f64,
    /// What the bill would roughly cost without the solar system.
    pub valor_estimado_sem_solar: f64,
    /// What was actually paid.
    pub valor_pago: Option<f64>,
}

// ============ Lead Models ============

/// Contact details captured on the lead form, frozen at submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub nome: String,
    pub whatsapp: String,
    pub cep: String,
    pub estado: String,
}

// ============ Flow Models ============

/// Screens of the upload-to-lead flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStep {
    Upload,
    Processing,
    Results,
    LeadCapture,
    Success,
}

impl AppStep {
    /// Steps reachable from `self` through a forward or error transition.
    ///
    /// Reset is global and is not listed here.
    pub fn allowed_transitions(self) -> &'static [AppStep] {
        use AppStep::*;
        match self {
            Upload => &[Processing],
            Processing => &[Results, Upload],
            Results => &[LeadCapture],
            LeadCapture => &[Success],
            Success => &[],
        }
    }

    pub fn can_transition_to(self, to: AppStep) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Answer to the "do you want the full simulation?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferAnswer {
    Sim,
    Nao,
}

/// An uploaded bill image or PDF ready for extraction.
#[derive(Debug, Clone)]
pub struct BillImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl BillImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Standard base64 payload for inline upload.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}
