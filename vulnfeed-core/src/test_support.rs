// ---------------------------------------------------------------------------
// Scripted collaborators for pipeline tests
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vulnfeed_source::{FetchError, PageFetcher, ScanDirectory};
use vulnfeed_types::{
    Continuation, DeadHostProofMap, Finding, HostRecord, Page, RequestDescriptor,
};

/// Pages served for one criterion ("groups", "tags" or "ips").
#[derive(Default, Clone)]
pub(crate) struct Script {
    pub pages: Vec<Vec<HostRecord>>,
    /// Page index whose fetch fails with a transport error.
    pub fail_at: Option<usize>,
    /// Page index whose fetch never completes.
    pub stall_at: Option<usize>,
}

impl Script {
    pub fn pages(pages: Vec<Vec<HostRecord>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn stalling_at(mut self, index: usize) -> Self {
        self.stall_at = Some(index);
        self
    }
}

#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: HashMap<&'static str, Script>,
    targets: Vec<String>,
    dead: DeadHostProofMap,
    calls: AtomicUsize,
    requests: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, criterion: &'static str, script: Script) -> Self {
        self.scripts.insert(criterion, script);
        self
    }

    pub fn with_scan(mut self, targets: &[&str], dead: &[(&str, &str)]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self.dead = dead
            .iter()
            .map(|(ip, proof)| (ip.to_string(), proof.to_string()))
            .collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn first_requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }
}

fn criterion(request: &RequestDescriptor) -> &'static str {
    if !request.tags.is_empty() {
        "tags"
    } else if !request.group_ids.is_empty() {
        "groups"
    } else {
        "ips"
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        request: &RequestDescriptor,
        continuation: Option<&Continuation>,
    ) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = criterion(request);
        let script = self
            .scripts
            .get(key)
            .ok_or_else(|| FetchError::NotFound(format!("no script for {key}")))?;

        let index = match continuation {
            None => {
                self.requests.lock().unwrap().push(request.clone());
                0
            }
            Some(cursor) => cursor
                .as_str()
                .rsplit(':')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| FetchError::Schema(format!("bad cursor {cursor}")))?,
        };

        if script.stall_at == Some(index) {
            std::future::pending::<()>().await;
        }
        if script.fail_at == Some(index) {
            return Err(FetchError::Transport(format!("{key} page {index} reset")));
        }

        let hosts = script
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| FetchError::Schema(format!("{key} page {index} missing")))?;
        let more = index + 1 < script.pages.len() || script.fail_at == Some(index + 1);
        match Continuation::new(format!("{key}:{}", index + 1)) {
            Some(cursor) if more => Ok(Page::with_continuation(hosts, cursor)),
            _ => Ok(Page::last(hosts)),
        }
    }
}

#[async_trait]
impl ScanDirectory for ScriptedFetcher {
    async fn scan_targets(&self, _scan_id: &str) -> Result<Vec<String>, FetchError> {
        Ok(self.targets.clone())
    }

    async fn dead_hosts(
        &self,
        _scan_id: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<DeadHostProofMap, FetchError> {
        Ok(self.dead.clone())
    }
}

/// Host with one active finding per QID.
pub(crate) fn host(id: &str, ip: &str, qids: &[&str]) -> HostRecord {
    let mut record = HostRecord::new(id, ip);
    record.findings = qids
        .iter()
        .map(|qid| Finding::new(*qid, "Active").with_proof(format!("proof for {qid}")))
        .collect();
    record
}

/// `count` hosts with ids starting at `first_id`, each carrying QID 38170.
pub(crate) fn numbered_hosts(first_id: usize, count: usize) -> Vec<HostRecord> {
    (first_id..first_id + count)
        .map(|n| {
            host(
                &n.to_string(),
                &format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff),
                &["38170"],
            )
        })
        .collect()
}
