use crate::errors::AppError;
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::time::Duration;

/// Result of resolving a CEP to its state (UF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionLookupOutcome {
    /// Two-letter state code.
    Found(String),
    NotFound,
}

/// Resolves an 8-digit CEP to a region code.
#[async_trait]
pub trait RegionLookup: Send + Sync {
    /// Looks up `cep_digits` (exactly eight digits, no mask).
    ///
    /// `Err` means the lookup itself failed; callers log it and clear the region.
    async fn lookup_region(&self, cep_digits: &str) -> Result<RegionLookupOutcome, AppError>;
}

/// ViaCEP client with an in-memory cache of resolved lookups.
#[derive(Clone)]
pub struct ViaCepClient {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, RegionLookupOutcome>,
}

impl ViaCepClient {
    /// Creates a new `ViaCepClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the ViaCEP service (e.g. `https://viacep.com.br`).
    pub fn new(base_url: String) -> Self {
        // Resolved CEPs rarely change; 24h TTL keeps repeated keystrokes off the network.
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(86400))
            .max_capacity(50_000)
            .build();

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    async fn fetch(&self, cep_digits: &str) -> Result<RegionLookupOutcome, AppError> {
        let url = format!("{}/ws/{}/json/", self.base_url, cep_digits);
        tracing::info!("Looking up CEP {} on ViaCEP", cep_digits);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("ViaCEP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "ViaCEP returned {}: {}",
                status, error_text
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse ViaCEP response: {}", e))
        })?;

        Ok(parse_viacep_response(&data))
    }
}

/// Interprets a ViaCEP body. The service flags misses with `"erro": true`
/// (older deployments send the string `"true"`).
fn parse_viacep_response(data: &Value) -> RegionLookupOutcome {
    let not_found = match data.get("erro") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if not_found {
        return RegionLookupOutcome::NotFound;
    }

    match data.get("uf").and_then(Value::as_str).map(str::trim) {
        Some(uf) if !uf.is_empty() => RegionLookupOutcome::Found(uf.to_uppercase()),
        _ => RegionLookupOutcome::NotFound,
    }
}

#[async_trait]
impl RegionLookup for ViaCepClient {
    async fn lookup_region(&self, cep_digits: &str) -> Result<RegionLookupOutcome, AppError> {
        if cep_digits.len() != 8 || !cep_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::BadRequest(format!(
                "CEP must have exactly 8 digits, got '{}'",
                cep_digits
            )));
        }

        let cache_key = format!("cep:{}", cep_digits);
        if let Some(cached) = self.cache.get(&cache_key).await {
            tracing::debug!("CEP cache hit: {}", cep_digits);
            return Ok(cached);
        }

        let outcome = self.fetch(cep_digits).await?;
        self.cache.insert(cache_key, outcome.clone()).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_found() {
        let body = json!({"cep": "01310-100", "uf": "sp", "localidade": "São Paulo"});
        assert_eq!(
            parse_viacep_response(&body),
            RegionLookupOutcome::Found("SP".to_string())
        );
    }

    #[test]
    fn test_parse_not_found_flags() {
        assert_eq!(
            parse_viacep_response(&json!({"erro": true})),
            RegionLookupOutcome::NotFound
        );
        assert_eq!(
            parse_viacep_response(&json!({"erro": "true"})),
            RegionLookupOutcome::NotFound
        );
        assert_eq!(
            parse_viacep_response(&json!({"uf": ""})),
            RegionLookupOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_rejects_malformed_cep_without_network() {
        let client = ViaCepClient::new("http://127.0.0.1:9".to_string());
        assert!(matches!(
            client.lookup_region("0131010").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
