use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::host::HostRecord;

/// Host address → proof text for hosts found dead by a scan.
pub type DeadHostProofMap = HashMap<String, String>;

/// Opaque cursor returned by the service while more results remain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Continuation(String);

impl Continuation {
    /// Wrap a raw cursor. Blank cursors mean "no more pages" and yield `None`.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One response of the host detection listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub hosts: Vec<HostRecord>,
    pub continuation: Option<Continuation>,
}

impl Page {
    pub fn last(hosts: Vec<HostRecord>) -> Self {
        Self {
            hosts,
            continuation: None,
        }
    }

    pub fn with_continuation(hosts: Vec<HostRecord>, continuation: Continuation) -> Self {
        Self {
            hosts,
            continuation: Some(continuation),
        }
    }
}
