use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of observation a finding is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    #[default]
    Vulnerability,
    SensitiveContent,
    InformationGathered,
    /// Confirmed/potential variants and anything else the service adds later.
    #[serde(other)]
    Other,
}

impl FindingKind {
    /// Parse the vendor's kind token. Matching is case-insensitive and
    /// tolerates spaces in place of underscores ("Information Gathered").
    pub fn from_vendor(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase().replace(' ', "_");
        match normalized.as_str() {
            "VULNERABILITY" | "CONFIRMED" => Self::Vulnerability,
            "SENSITIVE_CONTENT" => Self::SensitiveContent,
            "INFORMATION_GATHERED" | "INFO" => Self::InformationGathered,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vulnerability => write!(f, "VULNERABILITY"),
            Self::SensitiveContent => write!(f, "SENSITIVE_CONTENT"),
            Self::InformationGathered => write!(f, "INFORMATION_GATHERED"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// One vulnerability or informational observation embedded in a host record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    /// Vulnerability identifier (QID).
    pub vulnerability_id: String,
    #[serde(default)]
    pub kind: FindingKind,
    /// Status exactly as the service reported it ("New", "Re-Opened", ...).
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_found: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_found: Option<DateTime<Utc>>,
    #[serde(default)]
    pub times_found: u32,
    #[serde(default)]
    pub proof: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl Finding {
    pub fn new(vulnerability_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            vulnerability_id: vulnerability_id.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: FindingKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_proof(mut self, proof: impl Into<String>) -> Self {
        self.proof = proof.into();
        self
    }
}
