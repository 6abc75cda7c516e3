use thiserror::Error;

use super::types::Diagnostic;
use crate::resource::Attributes;

/// Transport and protocol errors of the HTTP plugin session.
///
/// SECURITY: Error messages must NEVER contain the session token.
#[derive(Debug, Error)]
pub enum HttpSessionError {
    /// Token rejected by the plugin
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Unexpected HTTP status without a readable envelope
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection failed, timed out, etc.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The plugin answered, but reported failure
    #[error("{}", render(.diagnostics))]
    Diagnostics {
        diagnostics: Vec<Diagnostic>,
        partial_state: Option<Attributes>,
    },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("invalid response: {message}")]
    Decode { message: String },
}

fn render(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        "provider reported failure without diagnostics".to_string()
    } else {
        errors.join("; ")
    }
}

impl HttpSessionError {
    pub fn into_partial_state(self) -> (String, Option<Attributes>) {
        match self {
            HttpSessionError::Diagnostics {
                diagnostics,
                partial_state,
            } => (render(&diagnostics), partial_state),
            other => (other.to_string(), None),
        }
    }
}

impl From<HttpSessionError> for crate::providers::ProviderError {
    fn from(err: HttpSessionError) -> Self {
        crate::providers::ProviderError::Configure {
            message: err.to_string(),
        }
    }
}
