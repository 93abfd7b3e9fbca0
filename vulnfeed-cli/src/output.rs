use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use vulnfeed_types::DetectionEvent;

/// One line of JSON output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Line<'a> {
    Detection(&'a DetectionEvent),
    DeadHost { ip: &'a str, proof: &'a str },
}

pub fn write_line<W: Write>(out: &mut W, line: &Line<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, line).context("failed to encode output line")?;
    out.write_all(b"\n").context("failed to write output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnfeed_types::{DetectionStatus, DeviceRef, VulnerabilityRef};

    #[test]
    fn detection_line_is_tagged() {
        let event = DetectionEvent {
            device: DeviceRef {
                id: "42".into(),
                ip: "10.0.0.1".into(),
                dns: None,
                instance_id: Some("i-0abc".into()),
            },
            vulnerability: VulnerabilityRef { id: "38170".into() },
            status: DetectionStatus::Fixed,
            proof: "banner".into(),
            first_found: None,
            last_found: None,
            times_seen: 3,
            port: Some(443),
            protocol: Some("tcp".into()),
        };

        let mut buf = Vec::new();
        write_line(&mut buf, &Line::Detection(&event)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(json["type"], "detection");
        assert_eq!(json["device"]["instance_id"], "i-0abc");
        assert_eq!(json["status"], "fixed");
        assert_eq!(json["port"], 443);
    }

    #[test]
    fn dead_host_line() {
        let mut buf = Vec::new();
        write_line(
            &mut buf,
            &Line::DeadHost {
                ip: "10.0.0.9",
                proof: "host not alive",
            },
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["type"], "dead_host");
        assert_eq!(json["ip"], "10.0.0.9");
    }
}
