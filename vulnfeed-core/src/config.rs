// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use vulnfeed_types::{DEFAULT_PAGE_SIZE, KernelFilter};

/// Which detections share a seen-set within one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// One seen-set for every criterion of a call: a host matched by both a
    /// group id and a tag is emitted once.
    #[default]
    PerCall,
    /// Independent seen-sets per criterion. The same device/vulnerability
    /// pair can be emitted once per criterion.
    PerCriterion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hosts expanded concurrently. 0 means one unit per host, unbounded.
    pub worker_budget: usize,
    /// Capacity of every channel between stages.
    pub channel_capacity: usize,
    /// Hosts requested per page (`truncation_limit`).
    pub page_size: usize,
    pub kernel_filter: KernelFilter,
    pub dedup_scope: DedupScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_budget: 32,
            channel_capacity: 64,
            page_size: DEFAULT_PAGE_SIZE,
            kernel_filter: KernelFilter::None,
            dedup_scope: DedupScope::PerCall,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be at least 1".into());
        }
        Ok(())
    }
}
