use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use vulnfeed_core::{DedupScope, PipelineConfig};
use vulnfeed_source::HttpSourceConfig;
use vulnfeed_types::KernelFilter;

use crate::args::{Args, DedupArg};

pub const USERNAME_VAR: &str = "VULNFEED_USERNAME";
pub const PASSWORD_VAR: &str = "VULNFEED_PASSWORD";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Settings read from the TOML configuration file.
///
/// Every field is optional; command line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// Service base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub pipeline: PipelineConfig,
}

fn default_config_path() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("vulnfeed").join("config.toml")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".vulnfeed").join("config.toml")
    }
}

pub fn load_config_file(path: &Path) -> Result<FeedConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;
    let config: FeedConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config '{}'", path.display()))?;
    Ok(config)
}

/// Load the explicit config file, else the default one when it exists.
pub fn load_config(explicit: Option<&Path>) -> Result<FeedConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    let path = default_config_path();
    if path.exists() {
        return load_config_file(&path);
    }
    Ok(FeedConfig::default())
}

/// Overlay command line flags onto the file settings.
pub fn apply_args(config: &mut FeedConfig, args: &Args) -> Result<()> {
    if let Some(ref endpoint) = args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = Some(secs);
    }
    if let Some(level) = args.kernel_filter {
        config.pipeline.kernel_filter = KernelFilter::try_from(level)
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid kernel filter")?;
    }
    if let Some(workers) = args.workers {
        config.pipeline.worker_budget = workers;
    }
    if let Some(page_size) = args.page_size {
        config.pipeline.page_size = page_size;
    }
    if let Some(dedup) = args.dedup {
        config.pipeline.dedup_scope = match dedup {
            DedupArg::PerCall => DedupScope::PerCall,
            DedupArg::PerCriterion => DedupScope::PerCriterion,
        };
    }

    config
        .pipeline
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid pipeline settings")?;
    Ok(())
}

impl FeedConfig {
    /// Connection settings for the HTTP source, credentials taken from the
    /// environment.
    pub fn source_config(&self) -> Result<HttpSourceConfig> {
        let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) else {
            bail!("no service endpoint configured (use --endpoint or `endpoint` in the config file)");
        };

        Ok(HttpSourceConfig {
            base_url: endpoint.to_string(),
            username: std::env::var(USERNAME_VAR).ok(),
            password: std::env::var(PASSWORD_VAR).ok(),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn file_settings_loaded() {
        let dir = std::env::temp_dir().join("vulnfeed_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
endpoint = "https://scanner.example.com"
timeout_secs = 60

[pipeline]
worker_budget = 4
kernel_filter = 1
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://scanner.example.com"));
        assert_eq!(config.timeout_secs, Some(60));
        assert_eq!(config.pipeline.worker_budget, 4);
        assert_eq!(
            config.pipeline.kernel_filter,
            KernelFilter::ExcludeNonExploitable
        );
        assert_eq!(config.pipeline.channel_capacity, 64);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("vulnfeed_no_such_config.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn flags_override_file() {
        let mut config = FeedConfig {
            endpoint: Some("https://file.example.com".into()),
            ..FeedConfig::default()
        };
        config.pipeline.worker_budget = 4;

        let args = Args::try_parse_from([
            "vulnfeed",
            "--endpoint",
            "https://flag.example.com",
            "-k",
            "4",
            "--dedup",
            "per-criterion",
            "ag1",
        ])
        .unwrap();
        apply_args(&mut config, &args).unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("https://flag.example.com"));
        assert_eq!(config.pipeline.kernel_filter, KernelFilter::OnlyKernel);
        assert_eq!(config.pipeline.dedup_scope, DedupScope::PerCriterion);
        // Not given on the command line
        assert_eq!(config.pipeline.worker_budget, 4);
    }

    #[test]
    fn source_config_requires_endpoint() {
        assert!(FeedConfig::default().source_config().is_err());

        let config = FeedConfig {
            endpoint: Some("https://scanner.example.com".into()),
            timeout_secs: Some(10),
            ..FeedConfig::default()
        };
        let source = config.source_config().unwrap();
        assert_eq!(source.base_url, "https://scanner.example.com");
        assert_eq!(source.timeout, Duration::from_secs(10));
    }
}
