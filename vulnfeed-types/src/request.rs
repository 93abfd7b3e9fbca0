use serde::{Deserialize, Serialize};
use std::fmt;

/// Hosts requested per page when the caller does not say otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 2500;

/// Selectors starting with this prefix name tags; everything else is a group id.
pub const TAG_PREFIX: &str = "tag-";

/// Server-side filter on kernel-related findings (`arf_kernel_filter`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum KernelFilter {
    /// No filtering on kernel activity.
    #[default]
    None = 0,
    /// Exclude kernel findings that are not exploitable (non-running kernels).
    ExcludeNonExploitable = 1,
    /// Only kernel findings that are not exploitable.
    OnlyNonExploitable = 2,
    /// Only kernel findings that are exploitable (running kernel).
    OnlyExploitable = 3,
    /// Only kernel findings.
    OnlyKernel = 4,
}

impl KernelFilter {
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for KernelFilter {
    type Error = String;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::ExcludeNonExploitable),
            2 => Ok(Self::OnlyNonExploitable),
            3 => Ok(Self::OnlyExploitable),
            4 => Ok(Self::OnlyKernel),
            _ => Err(format!("invalid kernel filter: {} (must be 0-4)", value)),
        }
    }
}

impl From<KernelFilter> for u8 {
    fn from(filter: KernelFilter) -> Self {
        filter.level()
    }
}

impl fmt::Display for KernelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Caller selectors split by criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorSet {
    pub group_ids: Vec<String>,
    /// Tag names or ids with the `tag-` prefix removed.
    pub tags: Vec<String>,
}

impl SelectorSet {
    /// Partition raw selectors: `tag-prod` is the tag `prod`, `ag1` is a group id.
    ///
    /// Blank entries are dropped, relative order within each side is kept.
    pub fn partition<S: AsRef<str>>(selectors: &[S]) -> Self {
        let mut set = Self::default();
        for raw in selectors {
            let selector = raw.as_ref().trim();
            if selector.is_empty() {
                continue;
            }
            match selector.strip_prefix(TAG_PREFIX) {
                Some(tag) if !tag.is_empty() => set.tags.push(tag.to_string()),
                Some(_) => {}
                None => set.group_ids.push(selector.to_string()),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.group_ids.is_empty() && self.tags.is_empty()
    }
}

/// Immutable filter set for one pagination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub group_ids: Vec<String>,
    pub tags: Vec<String>,
    pub ips: Vec<String>,
    pub kernel_filter: KernelFilter,
    /// Hosts per page; 0 asks the service for everything in one response.
    pub page_size: usize,
}

impl RequestDescriptor {
    pub fn for_groups(group_ids: Vec<String>, kernel_filter: KernelFilter) -> Self {
        Self {
            group_ids,
            tags: Vec::new(),
            ips: Vec::new(),
            kernel_filter,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn for_tags(tags: Vec<String>, kernel_filter: KernelFilter) -> Self {
        Self {
            group_ids: Vec::new(),
            tags,
            ips: Vec::new(),
            kernel_filter,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn for_ips(ips: Vec<String>, kernel_filter: KernelFilter) -> Self {
        Self {
            group_ids: Vec::new(),
            tags: Vec::new(),
            ips,
            kernel_filter,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Reject descriptors that select nothing.
    pub fn validate(&self) -> Result<(), String> {
        let has_any = |values: &[String]| values.iter().any(|v| !v.trim().is_empty());
        if !has_any(&self.group_ids) && !has_any(&self.tags) && !has_any(&self.ips) {
            return Err("request selects no group ids, tags or IPs".into());
        }
        Ok(())
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        if !self.tags.is_empty() {
            format!("tags [{}]", self.tags.join(","))
        } else if !self.group_ids.is_empty() {
            format!("groups [{}]", self.group_ids.join(","))
        } else {
            format!("{} ips", self.ips.len())
        }
    }
}
