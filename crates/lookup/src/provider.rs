//! Postal directory providers.

use async_trait::async_trait;
use canonical::{normalize_text, Cep};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use store::PostalAddress;

use crate::{LookupConfig, LookupError};

/// A street-level directory keyed by postal code.
///
/// Implementations make exactly one request per call; rate limiting, retry
/// and caching live in [`LookupClient`](crate::LookupClient).
#[async_trait]
pub trait PostalDirectory: Send + Sync {
    /// Short provider label used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self, cep: &Cep) -> Result<PostalAddress, LookupError>;
}

/// Body of a ViaCEP answer. Misses come back as `{"erro": true}` (older
/// deployments send the string `"true"`).
#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    uf: Option<String>,
    #[serde(default)]
    erro: Option<Value>,
}

impl ViaCepResponse {
    fn is_miss(&self) -> bool {
        match &self.erro {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn into_address(self) -> PostalAddress {
        PostalAddress {
            street: normalize_text(self.logradouro.as_deref()),
            neighborhood: normalize_text(self.bairro.as_deref()),
            locality: normalize_text(self.localidade.as_deref()),
            region: normalize_text(self.uf.as_deref()),
        }
    }
}

/// HTTP client for the public ViaCEP directory.
#[derive(Debug, Clone)]
pub struct ViaCepClient {
    base_url: String,
    http: reqwest::Client,
}

impl ViaCepClient {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("territory/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self::with_http_client(&config.base_url, http))
    }

    /// Use a caller-built `reqwest::Client`.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, cep: &Cep) -> String {
        format!("{}/{}/json/", self.base_url, cep)
    }
}

#[async_trait]
impl PostalDirectory for ViaCepClient {
    fn name(&self) -> &str {
        "viacep"
    }

    async fn fetch(&self, cep: &Cep) -> Result<PostalAddress, LookupError> {
        let response = self
            .http
            .get(self.url(cep))
            .send()
            .await
            .map_err(|e| LookupError::Transient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(cep.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Transient(format!(
                "HTTP error {status}: {body}"
            )));
        }

        let body: ViaCepResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Transient(format!("Invalid JSON response: {e}")))?;
        if body.is_miss() {
            return Err(LookupError::NotFound(cep.clone()));
        }
        Ok(body.into_address())
    }
}
