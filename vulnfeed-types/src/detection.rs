use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::DetectionStatus;

/// The device half of a detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// The vulnerability half of a detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRef {
    pub id: String,
}

/// Identity of a detection: at most one event per key is emitted on a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectionKey {
    pub device_id: String,
    pub vulnerability_id: String,
}

impl fmt::Display for DetectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.device_id, self.vulnerability_id)
    }
}

/// A device/vulnerability pairing with normalized status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub device: DeviceRef,
    pub vulnerability: VulnerabilityRef,
    pub status: DetectionStatus,
    pub proof: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_found: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_found: Option<DateTime<Utc>>,
    pub times_seen: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl DetectionEvent {
    pub fn key(&self) -> DetectionKey {
        DetectionKey {
            device_id: self.device.id.clone(),
            vulnerability_id: self.vulnerability.id.clone(),
        }
    }
}
