use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scan reference handed over by the scan orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanPayload {
    /// Vendor scan reference, e.g. `scan/1571160523.12345`.
    #[serde(default)]
    pub scan_id: String,
    #[serde(default)]
    pub name: String,
    /// When the scan was launched; dead hosts are only looked up from here on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Comma separated selectors a scheduled scan ran against.
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub scheduled: bool,
}

impl ScanPayload {
    /// Selectors recorded on a scheduled scan.
    pub fn selectors(&self) -> Vec<String> {
        self.group_id
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
