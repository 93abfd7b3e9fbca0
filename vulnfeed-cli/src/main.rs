mod args;
mod config;
mod output;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use output::{Line, write_line};
use vulnfeed_core::{
    CancellationToken, DetectionSource, DetectionStream, RunReport, parse_scan_payload,
};
use vulnfeed_source::HttpSource;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays JSON lines
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load_config(args.config.as_deref())?;
    config::apply_args(&mut config, &args)?;

    let http = Arc::new(
        HttpSource::new(config.source_config()?).context("failed to create HTTP source")?,
    );
    let source = DetectionSource::new(http.clone(), http, config.pipeline.clone());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        eprintln!("\nStopping...");
        cancel_clone.cancel();
    });

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let report = if let Some(ref path) = args.scan {
        let body = std::fs::read(path)
            .with_context(|| format!("failed to read scan payload '{}'", path.display()))?;
        let payload = parse_scan_payload(&body)?;

        let mut results = match source.scan_results(&payload, cancel.clone()).await {
            Ok(results) => results,
            Err(e) => {
                error!(scan = %payload.scan_id, error = %e, "failed to start scan results");
                return Err(e).context("failed to load scan results");
            }
        };

        while let Some((ip, proof)) = results.dead_hosts.recv().await {
            write_line(&mut out, &Line::DeadHost { ip: &ip, proof: &proof })?;
        }
        drain(results.detections, &mut out).await?
    } else {
        let stream = match source.detections(args.selectors.as_slice(), cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(selectors = ?args.selectors, error = %e, "failed to start detections");
                return Err(e).context("failed to load detections");
            }
        };
        drain(stream, &mut out).await?
    };
    out.flush().context("failed to flush output")?;

    info!(
        runs = report.runs.len(),
        hosts = report.hosts(),
        emitted = report.emitted(),
        duplicates = report.duplicates(),
        cancelled = report.cancelled,
        "detections finished"
    );
    for err in report.errors() {
        warn!(error = %err, "detection run error");
    }

    if report.cancelled {
        bail!("cancelled");
    }
    if !report.is_complete() {
        bail!("detection stream incomplete, see warnings above");
    }
    Ok(())
}

async fn drain<W: Write>(mut stream: DetectionStream, out: &mut W) -> Result<RunReport> {
    while let Some(event) = stream.recv().await {
        if let Err(e) = write_line(out, &Line::Detection(&event)) {
            stream.finish().await;
            return Err(e);
        }
    }
    Ok(stream.finish().await)
}
