// ---------------------------------------------------------------------------
// HTTP page fetcher and scan directory
// ---------------------------------------------------------------------------
//
// Talks to the scanning service's JSON endpoints. Authentication is optional
// basic credentials; retries are left to a wrapping fetcher.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use tracing::debug;
use vulnfeed_types::{
    CloudMetadata, Continuation, DeadHostProofMap, Finding, FindingKind, HostRecord, Page,
    RequestDescriptor,
};

use crate::fields::detection_fields;
use crate::{FetchError, PageFetcher, ScanDirectory, split_targets};

/// Host detection listing endpoint, relative to the base URL.
pub const DETECTION_PATH: &str = "/api/2.0/fo/asset/host/vm/detection/";

/// Scan listing/result endpoint, relative to the base URL.
pub const SCAN_PATH: &str = "/api/2.0/fo/scan/";

/// Result row status the service uses for hosts that did not answer.
const DEAD_HOST_STATUS: &str = "host not alive";

/// Connection settings for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Service root, e.g. `https://qualysapi.example.com`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout. Detection pages are large, keep this generous.
    pub timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            password: None,
            timeout: Duration::from_secs(300),
        }
    }
}

/// reqwest-backed [`PageFetcher`] and [`ScanDirectory`].
pub struct HttpSource {
    http: reqwest::Client,
    config: HttpSourceConfig,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, FetchError> {
        if config.base_url.trim().is_empty() {
            return Err(FetchError::Config("base URL is empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vulnfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        fields: &BTreeMap<&'static str, String>,
    ) -> Result<T, FetchError> {
        let mut request = self
            .http
            .post(url)
            .header("X-Requested-With", "vulnfeed")
            .form(fields);
        if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("POST {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read body of {url}: {e}")))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Schema(format!("{url}: {e}")))
    }
}

#[async_trait]
impl PageFetcher for HttpSource {
    async fn fetch_page(
        &self,
        request: &RequestDescriptor,
        continuation: Option<&Continuation>,
    ) -> Result<Page, FetchError> {
        let url = match continuation {
            Some(next) => next.as_str().to_string(),
            None => self.endpoint(DETECTION_PATH),
        };
        let fields = detection_fields(request);

        let response: DetectionListResponse = self.post_json(&url, &fields).await?;
        let continuation = response
            .warning
            .and_then(|w| w.url)
            .and_then(Continuation::new);

        debug!(
            url = %url,
            hosts = response.host_list.len(),
            more = continuation.is_some(),
            "host detection page received"
        );

        Ok(Page {
            hosts: response
                .host_list
                .into_iter()
                .map(WireHost::into_record)
                .collect(),
            continuation,
        })
    }
}

#[async_trait]
impl ScanDirectory for HttpSource {
    async fn scan_targets(&self, scan_id: &str) -> Result<Vec<String>, FetchError> {
        let mut fields = BTreeMap::new();
        fields.insert("action", "list".to_string());
        fields.insert("scan_ref", scan_id.to_string());

        let response: ScanListResponse = self.post_json(&self.endpoint(SCAN_PATH), &fields).await?;
        let scan = response
            .scan_list
            .into_iter()
            .find(|s| s.reference == scan_id)
            .ok_or_else(|| FetchError::NotFound(format!("scan {scan_id}")))?;

        Ok(split_targets(&scan.target))
    }

    async fn dead_hosts(
        &self,
        scan_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<DeadHostProofMap, FetchError> {
        let mut fields = BTreeMap::new();
        fields.insert("action", "fetch".to_string());
        fields.insert("scan_ref", scan_id.to_string());
        fields.insert("mode", "brief".to_string());
        fields.insert("output_format", "json".to_string());

        let rows: Vec<WireScanRow> = self.post_json(&self.endpoint(SCAN_PATH), &fields).await?;
        Ok(dead_hosts_from_rows(rows, since))
    }
}

fn dead_hosts_from_rows(rows: Vec<WireScanRow>, since: Option<DateTime<Utc>>) -> DeadHostProofMap {
    let mut dead = DeadHostProofMap::new();
    for row in rows {
        if !row.status.trim().eq_ignore_ascii_case(DEAD_HOST_STATUS) || row.ip.is_empty() {
            continue;
        }
        if let (Some(since), Some(seen)) = (since, parse_timestamp(row.date.as_deref()))
            && seen < since
        {
            continue;
        }
        let proof = row
            .result
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEAD_HOST_STATUS.to_string());
        dead.insert(row.ip, proof);
    }
    dead
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!(value = raw, error = %e, "ignoring unparseable timestamp");
            None
        }
    }
}

/// Accept ids and counters sent either as JSON strings or numbers.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// --- Service response types ---

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DetectionListResponse {
    #[serde(default)]
    host_list: Vec<WireHost>,
    #[serde(default)]
    warning: Option<WireWarning>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WireWarning {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WireHost {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    dns: Option<String>,
    #[serde(default)]
    metadata: Option<WireMetadata>,
    #[serde(default)]
    detection_list: Vec<WireDetection>,
}

impl WireHost {
    fn into_record(self) -> HostRecord {
        let cloud = self
            .metadata
            .and_then(|m| m.ec2)
            .map(|ec2| CloudMetadata {
                provider: "ec2".into(),
                instance_id: ec2.instance_id.filter(|id| !id.is_empty()),
            });

        HostRecord {
            host_id: self.id,
            ip: self.ip,
            dns: self.dns.filter(|d| !d.is_empty()),
            cloud,
            findings: self
                .detection_list
                .into_iter()
                .map(WireDetection::into_finding)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WireMetadata {
    #[serde(default)]
    ec2: Option<WireEc2>,
}

#[derive(Deserialize)]
struct WireEc2 {
    #[serde(rename = "instanceId", default)]
    instance_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WireDetection {
    #[serde(default, deserialize_with = "lenient_string")]
    qid: String,
    #[serde(rename = "TYPE", default)]
    kind: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    first_found_datetime: Option<String>,
    #[serde(default)]
    last_found_datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    times_found: String,
    #[serde(default)]
    results: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    port: String,
    #[serde(default)]
    protocol: Option<String>,
}

impl WireDetection {
    fn into_finding(self) -> Finding {
        Finding {
            vulnerability_id: self.qid,
            kind: FindingKind::from_vendor(&self.kind),
            status: self.status,
            first_found: parse_timestamp(self.first_found_datetime.as_deref()),
            last_found: parse_timestamp(self.last_found_datetime.as_deref()),
            times_found: self.times_found.trim().parse().unwrap_or(0),
            proof: self.results.unwrap_or_default(),
            port: self.port.trim().parse().ok(),
            protocol: self.protocol.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ScanListResponse {
    #[serde(default)]
    scan_list: Vec<WireScan>,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WireScan {
    #[serde(rename = "REF", default)]
    reference: String,
    #[serde(default)]
    target: String,
}

#[derive(Deserialize)]
struct WireScanRow {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    date: Option<String>,
}
