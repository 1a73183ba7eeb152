use serde::Deserialize;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VIACEP_BASE_URL: &str = "https://viacep.com.br";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Absent keys are reported to the user when a bill is uploaded, not at startup.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub webhook_url: Option<String>,
    pub viacep_base_url: String,
    pub session_ttl_secs: u64,
    pub lead_form_strict: bool,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            webhook_url: None,
            viacep_base_url: DEFAULT_VIACEP_BASE_URL.to_string(),
            session_ttl_secs: 3600,
            lead_form_strict: true,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

fn validate_http_url(name: &str, raw: String) -> anyhow::Result<String> {
    if raw.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    let parsed = url::Url::parse(&raw).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_bool(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} must be true or false, got '{}'", name, other),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .ok()
                .filter(|s| !s.trim().is_empty()),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .ok()
                .map(|url| validate_http_url("GEMINI_BASE_URL", url))
                .transpose()?
                .unwrap_or(defaults.gemini_base_url),
            gemini_model: std::env::var("GEMINI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.gemini_model),
            webhook_url: std::env::var("WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| validate_http_url("WEBHOOK_URL", url))
                .transpose()?,
            viacep_base_url: std::env::var("VIACEP_BASE_URL")
                .ok()
                .map(|url| validate_http_url("VIACEP_BASE_URL", url))
                .transpose()?
                .unwrap_or(defaults.viacep_base_url),
            session_ttl_secs: std::env::var("SESSION_TTL_SECS")
                .ok()
                .map(|v| {
                    v.parse::<u64>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| anyhow::anyhow!("SESSION_TTL_SECS must be a positive number"))
                })
                .transpose()?
                .unwrap_or(defaults.session_ttl_secs),
            lead_form_strict: std::env::var("LEAD_FORM_STRICT")
                .ok()
                .map(|v| parse_bool("LEAD_FORM_STRICT", &v))
                .transpose()?
                .unwrap_or(defaults.lead_form_strict),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .map(|v| {
                    v.parse::<usize>()
                        .ok()
                        .filter(|bytes| *bytes > 0)
                        .ok_or_else(|| anyhow::anyhow!("MAX_UPLOAD_BYTES must be a positive number"))
                })
                .transpose()?
                .unwrap_or(defaults.max_upload_bytes),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; bill uploads will fail with a configuration error");
        }
        tracing::debug!("Gemini: {} (model {})", config.gemini_base_url, config.gemini_model);
        match config.webhook_url {
            Some(ref webhook) => tracing::info!("Webhook URL configured: {}", webhook),
            None => tracing::warn!("WEBHOOK_URL not set; funnel events will only be logged"),
        }
        tracing::debug!("ViaCEP Base URL: {}", config.viacep_base_url);
        tracing::debug!(
            "Session TTL: {}s, strict lead form: {}, upload limit: {} bytes",
            config.session_ttl_secs,
            config.lead_form_strict,
            config.max_upload_bytes
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
