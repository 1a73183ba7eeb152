use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;

use crate::errors::{AppError, ResultExt};
use crate::models::{BillImage, BillRecord};
use crate::prompts;

/// Alert shown when the bill could not be read, whatever the underlying cause.
pub const FALLBACK_EXTRACTION_MESSAGE: &str =
    "Não foi possível ler a conta com clareza. Por favor, tente uma foto mais nítida e bem iluminada.";
pub const EMPTY_RESPONSE_MESSAGE: &str = "A IA retornou uma resposta vazia.";
pub const NARRATIVE_UNAVAILABLE: &str = "Resumo indisponível.";
pub const MISSING_KEY_MESSAGE: &str =
    "Chave da API não configurada. Defina GEMINI_API_KEY para analisar contas.";
pub const AUTH_FAILURE_MESSAGE: &str =
    "Erro de autenticação da API. Verifique a chave GEMINI_API_KEY.";

const EXTRACTION_TEMPERATURE: f64 = 0.1;
const NARRATIVE_TEMPERATURE: f64 = 0.7;

/// Multimodal document understanding used to read a bill.
#[async_trait]
pub trait DocumentIntelligence: Send + Sync {
    /// Reads the structured fields of a bill image or PDF.
    async fn extract_bill(&self, image: &BillImage) -> Result<BillRecord, AppError>;

    /// Writes the chat-style explanation of an extracted bill.
    ///
    /// An empty string means the service produced no text.
    async fn narrate(&self, bill: &BillRecord) -> Result<String, AppError>;
}

/// Extracts the bill and attaches its narrative.
///
/// Both calls must succeed; a blank narrative is replaced by a short placeholder.
pub async fn analyze_bill(
    intelligence: &dyn DocumentIntelligence,
    image: &BillImage,
) -> Result<BillRecord, AppError> {
    let mut bill = intelligence
        .extract_bill(image)
        .await
        .context("extracting bill fields")?;

    let narrative = intelligence
        .narrate(&bill)
        .await
        .context("generating bill narrative")?;

    bill.analise_informal = Some(if narrative.trim().is_empty() {
        NARRATIVE_UNAVAILABLE.to_string()
    } else {
        narrative
    });

    tracing::info!(
        "✓ Bill analyzed (solar: {}, total: {:?})",
        bill.tem_energia_solar,
        bill.valor_total
    );
    Ok(bill)
}

// ============ Gemini REST client ============

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Creates a new `GeminiClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root (e.g. `https://generativelanguage.googleapis.com`).
    /// * `model` - Model name (e.g. `gemini-2.5-flash`).
    /// * `api_key` - API key; when absent every call fails with a configuration error.
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn generate(&self, body: Value) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration(MISSING_KEY_MESSAGE.to_string()))?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status.as_u16() == 401 || status.as_u16() == 403 || error_text.contains("API key") {
                return Err(AppError::Configuration(AUTH_FAILURE_MESSAGE.to_string()));
            }
            return Err(AppError::ExternalApiError(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Gemini response: {}", e))
        })?;

        Ok(parsed.text())
    }
}

#[async_trait]
impl DocumentIntelligence for GeminiClient {
    async fn extract_bill(&self, image: &BillImage) -> Result<BillRecord, AppError> {
        tracing::info!(
            "Sending bill to Gemini ({}, {} bytes)",
            image.mime_type,
            image.bytes.len()
        );

        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompts::SYSTEM_INSTRUCTION }] },
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": image.mime_type, "data": image.to_base64() } },
                    { "text": prompts::ANALYSIS_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": prompts::bill_response_schema(),
                "temperature": EXTRACTION_TEMPERATURE
            },
            "safetySettings": permissive_safety_settings()
        });

        let text = self.generate(body).await?;
        parse_bill_response(&text)
    }

    async fn narrate(&self, bill: &BillRecord) -> Result<String, AppError> {
        let bill_json = serde_json::to_string(bill)
            .map_err(|e| AppError::InternalError(format!("Failed to serialize bill: {}", e)))?;

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompts::summary_prompt(&bill_json) }]
            }],
            "generationConfig": { "temperature": NARRATIVE_TEMPERATURE }
        });

        let text = self.generate(body).await?;
        tracing::debug!("Narrative received ({} chars)", text.chars().count());
        Ok(text)
    }
}

fn permissive_safety_settings() -> Value {
    let categories = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];
    Value::Array(
        categories
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect(),
    )
}

/// Removes Markdown code-fence markers wrapping a JSON answer.
pub fn strip_code_fences(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| Regex::new(r"```(?:json)?").expect("valid fence regex"));
    re.replace_all(text, "").trim().to_string()
}

/// Parses the extraction answer into a [`BillRecord`].
///
/// Every field the schema marks as required must be present and non-null.
pub fn parse_bill_response(text: &str) -> Result<BillRecord, AppError> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(AppError::Extraction(EMPTY_RESPONSE_MESSAGE.to_string()));
    }

    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        tracing::warn!("Gemini returned malformed JSON: {}", e);
        AppError::Extraction(FALLBACK_EXTRACTION_MESSAGE.to_string())
    })?;

    let missing: Vec<&str> = BillRecord::REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| value.get(field).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        tracing::warn!("Extraction is missing required fields: {:?}", missing);
        return Err(AppError::Extraction(
            FALLBACK_EXTRACTION_MESSAGE.to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        tracing::warn!("Extraction does not match the bill schema: {}", e);
        AppError::Extraction(FALLBACK_EXTRACTION_MESSAGE.to_string())
    })
}
