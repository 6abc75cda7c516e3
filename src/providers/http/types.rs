use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::Attributes;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Every plugin response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub result: Option<T>,
    /// Only meaningful on a failed create.
    #[serde(default)]
    pub partial_state: Option<Attributes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Invalid,
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Invalid => "INVALID",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub attribute_path: Vec<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity != Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if !self.attribute_path.is_empty() {
            write!(f, " at {}", self.attribute_path.join("."))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct PlanResult {
    pub planned_state: Attributes,
    #[serde(default)]
    pub requires_replace: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigureRequest<'a> {
    pub config: &'a Attributes,
}

#[derive(Debug, Serialize)]
pub struct ResourceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<&'a Attributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<&'a Attributes>,
}

#[derive(Debug, Serialize)]
pub struct ImportRequest<'a> {
    pub id: &'a str,
}
