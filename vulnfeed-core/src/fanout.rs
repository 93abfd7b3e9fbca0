// ---------------------------------------------------------------------------
// Fan-out and deduplication
// ---------------------------------------------------------------------------
//
// One unit of work per host record. Units run concurrently under a worker
// budget, expand their host, and emit each detection whose identity key is
// new to the shared seen-set. The output closes once every unit has been
// joined.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vulnfeed_types::{DeadHostProofMap, DetectionEvent, HostRecord};

use crate::error::{ExpandError, PipelineError};
use crate::expand::expand;
use crate::seen::SeenSet;

type Expander = fn(&HostRecord, &DeadHostProofMap) -> Result<Vec<DetectionEvent>, ExpandError>;

/// Counters for one fan-out run.
#[derive(Debug, Clone, Default)]
pub struct FanOutSummary {
    /// Hosts dispatched to a unit.
    pub hosts: usize,
    pub emitted: usize,
    /// Detections dropped because their key was already seen.
    pub duplicates: usize,
    /// Units whose host could not be expanded.
    pub failed_units: usize,
    pub panicked_units: usize,
    pub cancelled: bool,
    pub errors: Vec<PipelineError>,
}

impl FanOutSummary {
    fn record(&mut self, joined: Result<Result<UnitOutcome, ExpandError>, JoinError>) {
        match joined {
            Ok(Ok(outcome)) => {
                self.emitted += outcome.emitted;
                self.duplicates += outcome.duplicates;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "skipping malformed host");
                self.failed_units += 1;
                self.errors.push(PipelineError::MalformedHost(e));
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(error = %e, "host unit panicked");
                self.panicked_units += 1;
                self.errors.push(PipelineError::PanicRecovered(e.to_string()));
            }
        }
    }
}

#[derive(Debug, Default)]
struct UnitOutcome {
    emitted: usize,
    duplicates: usize,
}

pub struct FanOut {
    worker_budget: usize,
    seen: Arc<SeenSet>,
    dead_hosts: Arc<DeadHostProofMap>,
    expander: Expander,
}

impl FanOut {
    /// `worker_budget` of 0 runs every dispatched host at once.
    pub fn new(
        worker_budget: usize,
        seen: Arc<SeenSet>,
        dead_hosts: Arc<DeadHostProofMap>,
    ) -> Self {
        Self {
            worker_budget,
            seen,
            dead_hosts,
            expander: expand,
        }
    }

    #[cfg(test)]
    fn with_expander(mut self, expander: Expander) -> Self {
        self.expander = expander;
        self
    }

    /// Expand every host from `hosts` onto `out` and return once all units
    /// have finished.
    pub async fn run(
        self,
        mut hosts: mpsc::Receiver<HostRecord>,
        out: mpsc::Sender<DetectionEvent>,
        cancel: CancellationToken,
    ) -> FanOutSummary {
        let permits = if self.worker_budget == 0 {
            Semaphore::MAX_PERMITS
        } else {
            self.worker_budget
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut units: JoinSet<Result<UnitOutcome, ExpandError>> = JoinSet::new();
        let mut summary = FanOutSummary::default();

        loop {
            while let Some(joined) = units.try_join_next() {
                summary.record(joined);
            }

            let host = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = out.closed() => {
                    debug!("detection consumer went away");
                    summary.cancelled = true;
                    break;
                }
                host = hosts.recv() => match host {
                    Some(host) => host,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!(error = %e, "worker semaphore closed");
                        break;
                    }
                },
            };

            summary.hosts += 1;
            debug!(host = %host.device_id(), in_flight = units.len(), "dispatching host");

            let expander = self.expander;
            let dead_hosts = self.dead_hosts.clone();
            let seen = self.seen.clone();
            let out = out.clone();
            let cancel = cancel.clone();
            units.spawn(async move {
                let _permit = permit;
                process_host(host, expander, &dead_hosts, &seen, &out, &cancel).await
            });
        }

        if summary.cancelled {
            units.abort_all();
        }
        while let Some(joined) = units.join_next().await {
            summary.record(joined);
        }

        info!(
            hosts = summary.hosts,
            emitted = summary.emitted,
            duplicates = summary.duplicates,
            failed = summary.failed_units,
            panicked = summary.panicked_units,
            cancelled = summary.cancelled,
            "fan-out finished"
        );
        summary
    }
}

async fn process_host(
    host: HostRecord,
    expander: Expander,
    dead_hosts: &DeadHostProofMap,
    seen: &SeenSet,
    out: &mpsc::Sender<DetectionEvent>,
    cancel: &CancellationToken,
) -> Result<UnitOutcome, ExpandError> {
    let events = expander(&host, dead_hosts)?;
    let mut outcome = UnitOutcome::default();

    for event in events {
        if cancel.is_cancelled() {
            break;
        }
        if !seen.insert_if_absent(event.key()) {
            outcome.duplicates += 1;
            continue;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = out.send(event) => {
                if sent.is_err() {
                    break;
                }
                outcome.emitted += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{host, numbered_hosts};
    use std::collections::HashSet;
    use std::time::Duration;
    use vulnfeed_types::DetectionStatus;

    async fn run_with(
        fan_out: FanOut,
        hosts: Vec<HostRecord>,
        cancel: CancellationToken,
    ) -> (Vec<DetectionEvent>, FanOutSummary) {
        let (host_tx, host_rx) = mpsc::channel(hosts.len().max(1));
        for record in hosts {
            host_tx.send(record).await.unwrap();
        }
        drop(host_tx);

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = tokio::spawn(fan_out.run(host_rx, out_tx, cancel));

        let mut events = Vec::new();
        while let Some(event) = out_rx.recv().await {
            events.push(event);
        }
        (events, handle.await.unwrap())
    }

    fn fan_out(budget: usize) -> FanOut {
        FanOut::new(budget, Arc::new(SeenSet::new()), Arc::default())
    }

    #[tokio::test]
    async fn duplicate_keys_emitted_once() {
        let hosts = vec![
            host("1", "10.0.0.1", &["38170", "105"]),
            host("1", "10.0.0.1", &["38170"]),
        ];

        let (events, summary) = run_with(fan_out(4), hosts, CancellationToken::new()).await;

        assert_eq!(events.len(), 2);
        let keys: HashSet<_> = events.iter().map(|e| e.key().to_string()).collect();
        assert!(keys.contains("1;38170"));
        assert!(keys.contains("1;105"));
        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.hosts, 2);
    }

    #[tokio::test]
    async fn malformed_host_does_not_block_siblings() {
        let mut bad = host("2", "10.0.0.2", &["38170"]);
        bad.findings[0].status = "Bogus".into();
        let hosts = vec![
            host("1", "10.0.0.1", &["38170"]),
            bad,
            host("3", "10.0.0.3", &["38170"]),
        ];

        let (events, summary) = run_with(fan_out(2), hosts, CancellationToken::new()).await;

        let devices: HashSet<_> = events.iter().map(|e| e.device.id.clone()).collect();
        assert_eq!(devices, HashSet::from(["1".to_string(), "3".to_string()]));
        assert_eq!(summary.failed_units, 1);
        assert!(matches!(
            summary.errors.as_slice(),
            [PipelineError::MalformedHost(ExpandError::UnknownStatus { .. })]
        ));
    }

    fn exploding(
        host: &HostRecord,
        dead: &DeadHostProofMap,
    ) -> Result<Vec<DetectionEvent>, ExpandError> {
        if host.host_id == "boom" {
            panic!("expander blew up");
        }
        expand(host, dead)
    }

    #[tokio::test]
    async fn panicking_unit_is_contained() {
        let hosts = vec![
            host("1", "10.0.0.1", &["38170"]),
            host("boom", "10.0.0.2", &["38170"]),
            host("3", "10.0.0.3", &["38170"]),
        ];

        let (events, summary) = run_with(
            fan_out(0).with_expander(exploding),
            hosts,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(summary.panicked_units, 1);
        assert!(matches!(
            summary.errors.as_slice(),
            [PipelineError::PanicRecovered(_)]
        ));
    }

    #[tokio::test]
    async fn every_budget_emits_every_detection() {
        for budget in [0, 1, 8] {
            let (events, summary) =
                run_with(fan_out(budget), numbered_hosts(0, 40), CancellationToken::new()).await;
            assert_eq!(events.len(), 40, "budget {budget}");
            assert_eq!(summary.hosts, 40, "budget {budget}");
            assert!(events.iter().all(|e| e.status == DetectionStatus::Vulnerable));
        }
    }

    #[tokio::test]
    async fn dead_hosts_applied_to_units() {
        let dead: DeadHostProofMap = [("10.0.0.2".to_string(), "host not alive".to_string())]
            .into_iter()
            .collect();
        let fan_out = FanOut::new(4, Arc::new(SeenSet::new()), Arc::new(dead));
        let hosts = vec![
            host("1", "10.0.0.1", &["38170"]),
            host("2", "10.0.0.2", &["38170"]),
        ];

        let (events, _) = run_with(fan_out, hosts, CancellationToken::new()).await;

        let dead_event = events.iter().find(|e| e.device.id == "2").unwrap();
        assert_eq!(dead_event.status, DetectionStatus::DeadHost);
        assert_eq!(dead_event.proof, "host not alive");
        let live_event = events.iter().find(|e| e.device.id == "1").unwrap();
        assert_eq!(live_event.status, DetectionStatus::Vulnerable);
    }

    #[tokio::test]
    async fn cancelled_before_dispatch_emits_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (events, summary) = tokio::time::timeout(
            Duration::from_secs(2),
            run_with(fan_out(4), numbered_hosts(0, 10), cancel),
        )
        .await
        .unwrap();

        assert!(events.is_empty());
        assert!(summary.cancelled);
        assert_eq!(summary.hosts, 0);
    }

    #[tokio::test]
    async fn cancellation_unblocks_stalled_units() {
        let (host_tx, host_rx) = mpsc::channel(16);
        for record in numbered_hosts(0, 10) {
            host_tx.send(record).await.unwrap();
        }
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fan_out(4).run(host_rx, out_tx, cancel.clone()));

        assert!(out_rx.recv().await.is_some());
        cancel.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(summary.cancelled);
        assert!(summary.emitted < 10);
        drop(host_tx);
    }
}
