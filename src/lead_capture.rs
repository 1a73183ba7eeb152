//! Lead form masks, region-lookup bookkeeping and submit-time validation.

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde::{Deserialize, Serialize};

use crate::cep_client::RegionLookupOutcome;
use crate::models::LeadRecord;

/// Digits in a complete mobile number with area code.
pub const PHONE_DIGITS: usize = 11;

/// Digits in a complete CEP.
pub const CEP_DIGITS: usize = 8;

pub const NOME_REQUIRED: &str = "Nome completo é obrigatório.";
pub const WHATSAPP_INVALID: &str = "Informe um WhatsApp válido com DDD.";
pub const CEP_INVALID: &str = "Informe um CEP válido.";
pub const CEP_NOT_FOUND: &str = "CEP não encontrado.";

/// Keeps only ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Applies the `(DD) DDDDD-DDDD` mask progressively, dropping digits past the eleventh.
pub fn format_phone(raw: &str) -> String {
    let digits: Vec<char> = digits_only(raw).chars().take(PHONE_DIGITS).collect();
    let n = digits.len();

    if n <= 2 {
        return digits.iter().collect();
    }

    let area: String = digits[..2].iter().collect();
    if n <= 7 {
        let rest: String = digits[2..].iter().collect();
        return format!("({}) {}", area, rest);
    }

    let block: String = digits[2..7].iter().collect();
    let tail: String = digits[7..].iter().collect();
    format!("({}) {}-{}", area, block, tail)
}

/// Applies the `DDDDD-DDD` mask progressively, dropping digits past the eighth.
pub fn format_cep(raw: &str) -> String {
    let digits: String = digits_only(raw).chars().take(CEP_DIGITS).collect();
    if digits.len() <= 5 {
        return digits;
    }
    format!("{}-{}", &digits[..5], &digits[5..])
}

/// Editable lead form fields. The region (`estado`) is derived and never listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadField {
    Nome,
    Whatsapp,
    Cep,
}

/// How strictly the form is checked on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Per-field checks block submission and lookup misses are surfaced.
    Strict,
    /// Any input is accepted.
    Lenient,
}

/// Per-field error messages shown inline on the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cep: Option<String>,
}

impl FieldErrors {
    fn slot(&mut self, field: LeadField) -> &mut Option<String> {
        match field {
            LeadField::Nome => &mut self.nome,
            LeadField::Whatsapp => &mut self.whatsapp,
            LeadField::Cep => &mut self.cep,
        }
    }

    pub fn get(&self, field: LeadField) -> Option<&str> {
        match field {
            LeadField::Nome => self.nome.as_deref(),
            LeadField::Whatsapp => self.whatsapp.as_deref(),
            LeadField::Cep => self.cep.as_deref(),
        }
    }

    pub fn set(&mut self, field: LeadField, message: impl Into<String>) {
        *self.slot(field) = Some(message.into());
    }

    pub fn clear(&mut self, field: LeadField) {
        *self.slot(field) = None;
    }

    pub fn len(&self) -> usize {
        [&self.nome, &self.whatsapp, &self.cep]
            .iter()
            .filter(|e| e.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lead form state while the user is typing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadForm {
    pub nome: String,
    pub whatsapp: String,
    pub cep: String,
    pub estado: String,
    pub errors: FieldErrors,
    pub mode: ValidationMode,
}

impl LeadForm {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            nome: String::new(),
            whatsapp: String::new(),
            cep: String::new(),
            estado: String::new(),
            errors: FieldErrors::default(),
            mode,
        }
    }

    /// Applies a keystroke-level change to a field.
    ///
    /// Returns the cleaned CEP when it now has exactly eight digits, signalling
    /// that a region lookup should be fired.
    pub fn update(&mut self, field: LeadField, raw: &str) -> Option<String> {
        match field {
            LeadField::Nome => {
                self.nome = raw.to_string();
                if !self.nome.trim().is_empty() {
                    self.errors.clear(LeadField::Nome);
                }
                None
            }
            LeadField::Whatsapp => {
                self.whatsapp = format_phone(raw);
                if digits_only(&self.whatsapp).len() == PHONE_DIGITS {
                    self.errors.clear(LeadField::Whatsapp);
                }
                None
            }
            LeadField::Cep => {
                self.cep = format_cep(raw);
                let digits = digits_only(&self.cep);
                if digits.len() == CEP_DIGITS {
                    self.errors.clear(LeadField::Cep);
                    Some(digits)
                } else {
                    None
                }
            }
        }
    }

    /// Records the result of a region lookup fired for `cep_digits`.
    ///
    /// A result for a CEP the user has since changed is dropped. A failed
    /// lookup (`None`) is treated like "not found".
    pub fn apply_region_lookup(&mut self, cep_digits: &str, outcome: Option<RegionLookupOutcome>) {
        if digits_only(&self.cep) != cep_digits {
            tracing::debug!("Dropping stale region lookup for CEP {}", cep_digits);
            return;
        }

        match outcome {
            Some(RegionLookupOutcome::Found(uf)) => {
                self.estado = uf;
            }
            Some(RegionLookupOutcome::NotFound) | None => {
                self.estado.clear();
                if self.mode == ValidationMode::Strict {
                    self.errors.set(LeadField::Cep, CEP_NOT_FOUND);
                }
            }
        }
    }

    /// Checks every field and freezes the form into a [`LeadRecord`].
    ///
    /// On failure all field errors are stored on the form and returned.
    pub fn validate(&mut self) -> Result<LeadRecord, FieldErrors> {
        if self.mode == ValidationMode::Strict {
            let mut errors = FieldErrors::default();
            if self.nome.trim().is_empty() {
                errors.set(LeadField::Nome, NOME_REQUIRED);
            }
            if digits_only(&self.whatsapp).len() < PHONE_DIGITS {
                errors.set(LeadField::Whatsapp, WHATSAPP_INVALID);
            }
            if digits_only(&self.cep).len() < CEP_DIGITS {
                errors.set(LeadField::Cep, CEP_INVALID);
            }

            self.errors = errors.clone();
            if !errors.is_empty() {
                return Err(errors);
            }
        }

        Ok(LeadRecord {
            nome: self.nome.clone(),
            whatsapp: self.whatsapp.clone(),
            cep: self.cep.clone(),
            estado: self.estado.clone(),
        })
    }
}

impl LeadRecord {
    /// WhatsApp number in E.164 form (`+5511999998888`), when it parses as a valid BR number.
    pub fn whatsapp_e164(&self) -> Option<String> {
        let digits = digits_only(&self.whatsapp);
        match phonenumber::parse(Some(CountryId::BR), &digits) {
            Ok(number) if phonenumber::is_valid(&number) => {
                Some(number.format().mode(Mode::E164).to_string())
            }
            Ok(_) => {
                tracing::warn!("Lead WhatsApp is not a valid BR number: {}", self.whatsapp);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to parse lead WhatsApp '{}': {:?}", self.whatsapp, e);
                None
            }
        }
    }
}
