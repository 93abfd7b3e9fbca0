// ---------------------------------------------------------------------------
// Pagination engine
// ---------------------------------------------------------------------------
//
// Follows continuation cursors until the service stops returning one. The
// first page is fetched before `fetch_all` returns so its failure reaches the
// caller directly; later pages are fetched by a driver task that keeps one
// prefetch in flight while the current page is forwarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vulnfeed_source::{FetchError, PageFetcher};
use vulnfeed_types::{HostRecord, Page, RequestDescriptor};

use crate::error::PipelineError;

/// Outcome of one pagination run.
#[derive(Debug, Clone, Default)]
pub struct PaginationSummary {
    /// Short description of the request, for logs and reports.
    pub label: String,
    pub pages: usize,
    /// Host records forwarded downstream.
    pub hosts: usize,
    /// Fetch failure that ended the run after the first page.
    pub error: Option<PipelineError>,
    /// The run stopped early because of cancellation or a dropped consumer.
    pub cancelled: bool,
}

impl PaginationSummary {
    fn new(label: String) -> Self {
        Self {
            label,
            ..Self::default()
        }
    }
}

/// Host records of one pagination run, in arrival order.
pub struct HostStream {
    hosts: mpsc::Receiver<HostRecord>,
    driver: JoinHandle<PaginationSummary>,
}

impl HostStream {
    pub async fn recv(&mut self) -> Option<HostRecord> {
        self.hosts.recv().await
    }

    /// Stop consuming and wait for the driver to wind down.
    pub async fn finish(self) -> PaginationSummary {
        let Self { hosts, driver } = self;
        drop(hosts);
        join_driver(driver).await
    }

    pub(crate) fn into_parts(self) -> (mpsc::Receiver<HostRecord>, JoinHandle<PaginationSummary>) {
        (self.hosts, self.driver)
    }
}

pub(crate) async fn join_driver(driver: JoinHandle<PaginationSummary>) -> PaginationSummary {
    match driver.await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "pagination driver failed");
            PaginationSummary {
                error: Some(PipelineError::PanicRecovered(e.to_string())),
                ..PaginationSummary::default()
            }
        }
    }
}

/// Fetch every page for `request` and stream the hosts.
///
/// Returns `InvalidRequest` before any network call when the request selects
/// nothing, and the first page's fetch error as-is. Host order across pages is
/// not defined; every host of every page is forwarded exactly once.
pub async fn fetch_all(
    fetcher: Arc<dyn PageFetcher>,
    request: RequestDescriptor,
    channel_capacity: usize,
    cancel: CancellationToken,
) -> Result<HostStream, PipelineError> {
    request.validate().map_err(PipelineError::InvalidRequest)?;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let label = request.label();
    info!(request = %label, page_size = request.page_size, "loading hosts");

    let first = tokio::select! {
        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
        page = fetcher.fetch_page(&request, None) => page,
    };
    let first = first.map_err(|e| {
        warn!(request = %label, error = %e, "first page fetch failed");
        PipelineError::from(e)
    })?;

    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let driver = tokio::spawn(drive(fetcher, Arc::new(request), label, first, tx, cancel));

    Ok(HostStream { hosts: rx, driver })
}

/// In-flight fetch of the next page. Dropping it aborts the fetch.
struct Prefetch(JoinHandle<Result<Page, FetchError>>);

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn drive(
    fetcher: Arc<dyn PageFetcher>,
    request: Arc<RequestDescriptor>,
    label: String,
    first: Page,
    tx: mpsc::Sender<HostRecord>,
    cancel: CancellationToken,
) -> PaginationSummary {
    let mut summary = PaginationSummary::new(label);
    let mut page = first;

    loop {
        summary.pages += 1;
        let Page {
            hosts,
            continuation,
        } = page;
        info!(
            request = %summary.label,
            page = summary.pages,
            hosts = hosts.len(),
            more = continuation.is_some(),
            "processing page"
        );

        // Start on the next page before forwarding this one.
        let mut prefetch = match continuation {
            Some(_) if cancel.is_cancelled() => {
                summary.cancelled = true;
                return summary;
            }
            Some(cursor) => {
                let fetcher = fetcher.clone();
                let request = request.clone();
                Some(Prefetch(tokio::spawn(async move {
                    fetcher.fetch_page(&request, Some(&cursor)).await
                })))
            }
            None => None,
        };

        for host in hosts {
            debug!(host = %host.host_id, findings = host.findings.len(), "forwarding host");
            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    return summary;
                }
                sent = tx.send(host) => {
                    if sent.is_err() {
                        debug!(request = %summary.label, "host consumer went away");
                        summary.cancelled = true;
                        return summary;
                    }
                    summary.hosts += 1;
                }
            }
        }

        let Some(next) = prefetch.as_mut() else {
            break;
        };
        let fetched = tokio::select! {
            _ = cancel.cancelled() => {
                summary.cancelled = true;
                return summary;
            }
            joined = &mut next.0 => joined,
        };

        page = match fetched {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!(
                    request = %summary.label,
                    page = summary.pages + 1,
                    error = %e,
                    "page fetch failed, ending run"
                );
                summary.error = Some(PipelineError::from(e));
                break;
            }
            Err(e) => {
                warn!(request = %summary.label, error = %e, "page fetch task failed");
                summary.error = Some(PipelineError::PanicRecovered(e.to_string()));
                break;
            }
        };
    }

    info!(
        request = %summary.label,
        pages = summary.pages,
        hosts = summary.hosts,
        failed = summary.error.is_some(),
        "pagination finished"
    );
    summary
}
