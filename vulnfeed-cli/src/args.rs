use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// vulnfeed: stream host detections from a vulnerability scanning service
#[derive(Parser, Debug)]
#[command(
    name = "vulnfeed",
    version,
    about = "Stream deduplicated host detections as JSON lines"
)]
pub struct Args {
    /// Asset group ids, or tags written as `tag-<name>`
    #[arg(value_name = "SELECTOR", required_unless_present = "scan", num_args = 1..)]
    pub selectors: Vec<String>,

    /// Read the results of one scan, described by a JSON payload file
    #[arg(long = "scan", value_name = "FILE", conflicts_with = "selectors")]
    pub scan: Option<PathBuf>,

    /// Configuration file (default: ~/.vulnfeed/config.toml when present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Service base URL, overrides the configuration file
    #[arg(long = "endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Kernel filter (0-4): 0=none, 1=exclude non-exploitable kernel, 2=only non-exploitable kernel, 3=only exploitable kernel, 4=only kernel
    #[arg(short = 'k', long = "kernel-filter", value_name = "0-4", value_parser = clap::value_parser!(u8).range(0..=4))]
    pub kernel_filter: Option<u8>,

    /// Hosts expanded concurrently (0 = unbounded)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Hosts requested per page
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<usize>,

    /// Whether group and tag runs share one seen-set
    #[arg(long = "dedup", value_enum, value_name = "SCOPE")]
    pub dedup: Option<DedupArg>,

    /// Request timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Increase verbosity level (use -v or -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupArg {
    PerCall,
    PerCriterion,
}
