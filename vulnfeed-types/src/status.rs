use serde::{Deserialize, Serialize};
use std::fmt;

use crate::finding::FindingKind;

/// Canonical status of an emitted detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Vulnerable,
    Fixed,
    Informational,
    /// The host did not respond during the scan that produced this result.
    DeadHost,
}

impl DetectionStatus {
    /// Map a vendor status and finding kind onto the canonical vocabulary.
    ///
    /// `INFORMATION_GATHERED` findings are informational regardless of
    /// status. Returns `None` for statuses outside the vocabulary. The
    /// dead-host override is applied by the caller, which owns the lookup.
    pub fn from_vendor(raw_status: &str, kind: FindingKind) -> Option<Self> {
        if kind == FindingKind::InformationGathered {
            return Some(Self::Informational);
        }

        match raw_status.trim().to_ascii_lowercase().as_str() {
            "new" | "active" | "re-opened" | "reopened" | "protected" => Some(Self::Vulnerable),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

impl fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vulnerable => write!(f, "vulnerable"),
            Self::Fixed => write!(f, "fixed"),
            Self::Informational => write!(f, "informational"),
            Self::DeadHost => write!(f, "dead_host"),
        }
    }
}
