use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a detected policy violation.
///
/// Severity is fixed per category so that compliance handling never depends
/// on free-form reason strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    FairHousing,
    FinancialRegulation,
    Privacy,
    Licensing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl ViolationCategory {
    pub fn severity(&self) -> Severity {
        match self {
            Self::FairHousing | Self::FinancialRegulation => Severity::Critical,
            Self::Privacy => Severity::High,
            Self::Licensing => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FairHousing => "fair_housing",
            Self::FinancialRegulation => "financial_regulation",
            Self::Privacy => "privacy",
            Self::Licensing => "licensing",
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
        }
    }

    /// Critical and high severity violations pause automated contact.
    pub fn pauses_automation(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

/// Failure taxonomy for the qualification engine.
///
/// Retryability is a property of the kind, not of the call site: the retry
/// wrapper consults `is_retryable` and everything else propagates to the
/// orchestrator, which decides fallback or escalation centrally.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),
    #[error("upstream service `{service}` failed: {message}")]
    UpstreamService { service: String, message: String },
    #[error("invalid caller input: {0}")]
    Validation(String),
    #[error("policy violation: {}", .0.as_str())]
    PolicyViolation(ViolationCategory),
    #[error("assessment failure: {0}")]
    Assessment(String),
}

impl EngineError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamService { service: service.into(), message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::UpstreamService { .. })
    }

    /// Short machine-readable class, used in audit metadata and logs.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "transient_network",
            Self::UpstreamService { .. } => "upstream_service",
            Self::Validation(_) => "validation",
            Self::PolicyViolation(_) => "policy_violation",
            Self::Assessment(_) => "assessment",
        }
    }

    /// User-safe text for terminal failures. The buyer never sees a raw
    /// technical error; hyphen free to satisfy the channel rules.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) | Self::UpstreamService { .. } => {
                "Sorry, I hit a snag on my end. A member of our team will follow up with you shortly."
            }
            Self::Validation(_) => {
                "I could not read that message. Could you try rephrasing it for me?"
            }
            Self::PolicyViolation(_) => {
                "Thanks for your message. A licensed member of our team will take it from here."
            }
            Self::Assessment(_) => {
                "I could not finish reviewing your details just now, but I have saved our conversation and will pick it back up."
            }
        }
    }
}
