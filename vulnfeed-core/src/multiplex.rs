// ---------------------------------------------------------------------------
// Stream multiplexing
// ---------------------------------------------------------------------------
//
// A `DetectionStream` is the consumer-facing end of one or more pagination
// runs. Its report is produced by a background task that resolves once every
// run behind the stream has been joined.

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vulnfeed_types::DetectionEvent;

use crate::error::PipelineError;
use crate::fanout::{FanOut, FanOutSummary};
use crate::pagination::{HostStream, PaginationSummary, join_driver};

/// Pagination and fan-out counters of one criterion.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub pagination: PaginationSummary,
    pub fan_out: FanOutSummary,
}

/// What happened behind a detection stream, available once it has closed.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub runs: Vec<RunSummary>,
    /// Failures outside any single run, such as a panicked forwarder.
    pub faults: Vec<PipelineError>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn emitted(&self) -> usize {
        self.runs.iter().map(|r| r.fan_out.emitted).sum()
    }

    pub fn hosts(&self) -> usize {
        self.runs.iter().map(|r| r.pagination.hosts).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.runs.iter().map(|r| r.fan_out.duplicates).sum()
    }

    /// Every error recorded: mid-stream fetch failures, failed or panicked
    /// units, and faults.
    pub fn errors(&self) -> impl Iterator<Item = &PipelineError> {
        self.runs
            .iter()
            .flat_map(|r| r.pagination.error.iter().chain(r.fan_out.errors.iter()))
            .chain(self.faults.iter())
    }

    /// True when every page of every run was fetched and forwarded.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.faults.is_empty()
            && self
                .runs
                .iter()
                .all(|r| r.pagination.error.is_none() && !r.pagination.cancelled)
    }

    fn absorb(&mut self, other: RunReport) {
        self.runs.extend(other.runs);
        self.faults.extend(other.faults);
        self.cancelled |= other.cancelled;
    }
}

/// Detection events of one call. Closes exactly once, after every stage
/// behind it has finished.
pub struct DetectionStream {
    events: mpsc::Receiver<DetectionEvent>,
    report: JoinHandle<RunReport>,
}

impl DetectionStream {
    pub async fn recv(&mut self) -> Option<DetectionEvent> {
        self.events.recv().await
    }

    /// Stop consuming and wait for the report.
    pub async fn finish(self) -> RunReport {
        let Self { events, report } = self;
        drop(events);
        join_report(report).await
    }

    /// Drain every remaining event, then wait for the report.
    pub async fn collect(mut self) -> (Vec<DetectionEvent>, RunReport) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let report = self.finish().await;
        (events, report)
    }
}

async fn join_report(report: JoinHandle<RunReport>) -> RunReport {
    match report.await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "report task failed");
            RunReport {
                faults: vec![PipelineError::PanicRecovered(e.to_string())],
                ..RunReport::default()
            }
        }
    }
}

/// Connect a pagination run to a fan-out and expose its detections.
pub(crate) fn pipeline(
    hosts: HostStream,
    fan_out: FanOut,
    channel_capacity: usize,
    cancel: CancellationToken,
) -> DetectionStream {
    let (host_rx, driver) = hosts.into_parts();
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));

    let report = tokio::spawn(async move {
        let fan_out = fan_out.run(host_rx, tx, cancel.clone()).await;
        let pagination = join_driver(driver).await;
        RunReport {
            cancelled: fan_out.cancelled || cancel.is_cancelled(),
            runs: vec![RunSummary {
                pagination,
                fan_out,
            }],
            faults: Vec::new(),
        }
    });

    DetectionStream { events: rx, report }
}

/// Merge several detection streams into one. The merged stream closes after
/// every input has closed; its report combines theirs.
pub fn merge(
    streams: Vec<DetectionStream>,
    channel_capacity: usize,
    cancel: CancellationToken,
) -> DetectionStream {
    let mut streams = streams;
    if streams.len() == 1
        && let Some(stream) = streams.pop()
    {
        return stream;
    }

    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let report = tokio::spawn(async move {
        let mut forwarders: JoinSet<RunReport> = JoinSet::new();
        for stream in streams {
            forwarders.spawn(forward(stream, tx.clone(), cancel.clone()));
        }
        drop(tx);

        let mut merged = RunReport::default();
        while let Some(joined) = forwarders.join_next().await {
            match joined {
                Ok(report) => merged.absorb(report),
                Err(e) => {
                    warn!(error = %e, "stream forwarder failed");
                    merged
                        .faults
                        .push(PipelineError::PanicRecovered(e.to_string()));
                }
            }
        }
        merged.cancelled |= cancel.is_cancelled();

        info!(
            runs = merged.runs.len(),
            hosts = merged.hosts(),
            emitted = merged.emitted(),
            complete = merged.is_complete(),
            "merged streams finished"
        );
        merged
    });

    DetectionStream { events: rx, report }
}

async fn forward(
    stream: DetectionStream,
    tx: mpsc::Sender<DetectionEvent>,
    cancel: CancellationToken,
) -> RunReport {
    let DetectionStream { mut events, report } = stream;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    debug!("merged consumer went away");
                    break;
                }
            }
        }
    }

    drop(events);
    join_report(report).await
}
