use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::HttpSessionError;
use super::types::{DEFAULT_TIMEOUT_SECS, Diagnostic, Envelope};

/// Successful reply of the plugin, with any non-fatal diagnostics.
#[derive(Debug)]
pub struct Reply<T> {
    pub result: Option<T>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, HttpSessionError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let header_value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                HttpSessionError::Auth {
                    message: "Invalid token format".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, header_value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build()
            .map_err(HttpSessionError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Reply<T>, HttpSessionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Reply<T>, HttpSessionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Reply<T>, HttpSessionError> {
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(HttpSessionError::Auth {
                    message: format!("plugin rejected credentials ({})", status.as_u16()),
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(HttpSessionError::NotFound {
                    path: path.to_string(),
                });
            }
            _ => {}
        }

        let body: serde_json::Value = response.json().await.map_err(|e| HttpSessionError::Api {
            status: status.as_u16(),
            message: format!("Failed to parse response: {}", e),
        })?;

        let envelope: Envelope<T> =
            serde_json::from_value(body).map_err(|e| HttpSessionError::Decode {
                message: format!("{path}: {e}"),
            })?;

        if !envelope.success || envelope.diagnostics.iter().any(Diagnostic::is_error) {
            return Err(HttpSessionError::Diagnostics {
                diagnostics: envelope.diagnostics,
                partial_state: envelope.partial_state,
            });
        }

        for warning in &envelope.diagnostics {
            tracing::warn!(path, "{warning}");
        }

        Ok(Reply {
            result: envelope.result,
            warnings: envelope.diagnostics,
        })
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
