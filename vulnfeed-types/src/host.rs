use serde::{Deserialize, Serialize};

use crate::finding::Finding;

/// Cloud provider metadata attached to a host by the scanning service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudMetadata {
    /// Provider label (e.g., "ec2").
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// One scanned asset with every finding reported for it on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// Identifier assigned by the scanning service.
    pub host_id: String,
    /// Address the host was scanned at.
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudMetadata>,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl HostRecord {
    pub fn new(host_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            ip: ip.into(),
            dns: None,
            cloud: None,
            findings: Vec::new(),
        }
    }

    /// Identifier used for the device half of a detection's identity key.
    ///
    /// Falls back to the IP address when the service did not assign an id.
    pub fn device_id(&self) -> &str {
        if self.host_id.is_empty() {
            &self.ip
        } else {
            &self.host_id
        }
    }
}
