// ---------------------------------------------------------------------------
// Detection source
// ---------------------------------------------------------------------------
//
// Entry point for consumers. Splits selectors into criteria, starts one
// pagination run per criterion and merges their detections into a single
// stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vulnfeed_source::{PageFetcher, ScanDirectory};
use vulnfeed_types::{DeadHostProofMap, RequestDescriptor, ScanPayload, SelectorSet};

use crate::config::{DedupScope, PipelineConfig};
use crate::error::PipelineError;
use crate::fanout::FanOut;
use crate::multiplex::{DetectionStream, merge, pipeline};
use crate::pagination::{HostStream, fetch_all};
use crate::seen::SeenSet;

/// Detections of one scan plus the hosts that did not respond to it.
pub struct ScanResultStream {
    pub detections: DetectionStream,
    /// `(ip, proof)` for every dead host. Always closes.
    pub dead_hosts: mpsc::Receiver<(String, String)>,
}

pub struct DetectionSource {
    fetcher: Arc<dyn PageFetcher>,
    directory: Arc<dyn ScanDirectory>,
    config: PipelineConfig,
}

impl DetectionSource {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        directory: Arc<dyn ScanDirectory>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            directory,
            config,
        }
    }

    /// Stream every detection on hosts matched by `selectors`.
    ///
    /// Selectors starting with `tag-` select by tag, all others by asset
    /// group id. Fails before emitting anything when no selector is usable or
    /// the first page of any criterion cannot be fetched.
    pub async fn detections<S: AsRef<str>>(
        &self,
        selectors: &[S],
        cancel: CancellationToken,
    ) -> Result<DetectionStream, PipelineError> {
        self.config.validate().map_err(PipelineError::InvalidRequest)?;

        let selectors = SelectorSet::partition(selectors);
        if selectors.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "no group ids or tags given".into(),
            ));
        }

        let mut requests = Vec::new();
        if !selectors.group_ids.is_empty() {
            requests.push(self.descriptor(RequestDescriptor::for_groups(
                selectors.group_ids,
                self.config.kernel_filter,
            )));
        }
        if !selectors.tags.is_empty() {
            requests.push(self.descriptor(RequestDescriptor::for_tags(
                selectors.tags,
                self.config.kernel_filter,
            )));
        }

        self.run_requests(requests, Arc::default(), cancel).await
    }

    /// Stream the detections of one finished scan.
    ///
    /// Scheduled scans are read back through their selectors. Other scans
    /// are read by target address, with hosts that did not respond reported
    /// as dead both on the detections and on the dead-host side stream.
    pub async fn scan_results(
        &self,
        payload: &ScanPayload,
        cancel: CancellationToken,
    ) -> Result<ScanResultStream, PipelineError> {
        if payload.scheduled {
            let selectors = payload.selectors();
            if selectors.is_empty() {
                return Err(PipelineError::InvalidRequest(format!(
                    "scheduled scan {:?} has no group id",
                    payload.name
                )));
            }
            info!(scan = %payload.name, selectors = selectors.len(), "loading scheduled scan results");
            let detections = self.detections(selectors.as_slice(), cancel).await?;
            let (_, dead_hosts) = mpsc::channel(1);
            return Ok(ScanResultStream {
                detections,
                dead_hosts,
            });
        }

        let scan_id = payload.scan_id.trim();
        if scan_id.is_empty() {
            return Err(PipelineError::InvalidRequest("scan has no id".into()));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let targets = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            targets = self.directory.scan_targets(scan_id) => targets?,
        };
        let dead = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            dead = self.directory.dead_hosts(scan_id, payload.created) => dead?,
        };
        info!(
            scan = %scan_id,
            targets = targets.len(),
            dead = dead.len(),
            "loading scan results"
        );

        // Every entry fits, so the side stream needs no task of its own.
        let (dead_tx, dead_hosts) = mpsc::channel(dead.len().max(1));
        for (ip, proof) in &dead {
            let _ = dead_tx.try_send((ip.clone(), proof.clone()));
        }
        drop(dead_tx);

        let request = self.descriptor(RequestDescriptor::for_ips(
            targets,
            self.config.kernel_filter,
        ));
        let detections = self
            .run_requests(vec![request], Arc::new(dead), cancel)
            .await?;

        Ok(ScanResultStream {
            detections,
            dead_hosts,
        })
    }

    fn descriptor(&self, request: RequestDescriptor) -> RequestDescriptor {
        request.with_page_size(self.config.page_size)
    }

    async fn run_requests(
        &self,
        requests: Vec<RequestDescriptor>,
        dead_hosts: Arc<DeadHostProofMap>,
        cancel: CancellationToken,
    ) -> Result<DetectionStream, PipelineError> {
        // Cancelled on a first-page failure; the caller's token is untouched.
        let call = cancel.child_token();
        let capacity = self.config.channel_capacity;

        let mut starts: JoinSet<Result<HostStream, PipelineError>> = JoinSet::new();
        for request in requests {
            starts.spawn(fetch_all(
                self.fetcher.clone(),
                request,
                capacity,
                call.clone(),
            ));
        }

        let mut started = Vec::new();
        let mut failure = None;
        while let Some(joined) = starts.join_next().await {
            match joined {
                Ok(Ok(hosts)) => started.push(hosts),
                // Siblings stopped by `call` report Cancelled; keep the first error.
                Ok(Err(e)) => {
                    call.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    call.cancel();
                    failure.get_or_insert(PipelineError::PanicRecovered(e.to_string()));
                }
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "first page failed, abandoning call");
            for hosts in started {
                hosts.finish().await;
            }
            return Err(err);
        }

        let shared = Arc::new(SeenSet::new());
        let streams = started
            .into_iter()
            .map(|hosts| {
                let seen = match self.config.dedup_scope {
                    DedupScope::PerCall => shared.clone(),
                    DedupScope::PerCriterion => Arc::new(SeenSet::new()),
                };
                let fan_out = FanOut::new(self.config.worker_budget, seen, dead_hosts.clone());
                pipeline(hosts, fan_out, capacity, call.clone())
            })
            .collect();

        Ok(merge(streams, capacity, call))
    }
}

/// Parse a scan notification body.
pub fn parse_scan_payload(body: &[u8]) -> Result<ScanPayload, PipelineError> {
    serde_json::from_slice(body)
        .map_err(|e| PipelineError::InvalidRequest(format!("scan payload: {e}")))
}
