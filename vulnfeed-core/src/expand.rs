// ---------------------------------------------------------------------------
// Detection expansion
// ---------------------------------------------------------------------------

use tracing::debug;
use vulnfeed_types::{
    DeadHostProofMap, DetectionEvent, DetectionStatus, DeviceRef, HostRecord, VulnerabilityRef,
};

use crate::error::ExpandError;

/// Turn one host record into one detection per finding, in finding order.
///
/// A host whose address is in `dead_hosts` yields `DeadHost` detections
/// carrying the recorded proof instead of the finding's own. Any finding with
/// an empty vulnerability id or a status outside the vocabulary fails the
/// whole host.
pub fn expand(
    host: &HostRecord,
    dead_hosts: &DeadHostProofMap,
) -> Result<Vec<DetectionEvent>, ExpandError> {
    let device = DeviceRef {
        id: host.device_id().to_string(),
        ip: host.ip.clone(),
        dns: host.dns.clone(),
        instance_id: host.cloud.as_ref().and_then(|c| c.instance_id.clone()),
    };
    let dead_proof = dead_hosts.get(&host.ip);

    let mut events = Vec::with_capacity(host.findings.len());
    for (index, finding) in host.findings.iter().enumerate() {
        let vulnerability_id = finding.vulnerability_id.trim();
        if vulnerability_id.is_empty() {
            return Err(ExpandError::MissingVulnerabilityId {
                host: device.id.clone(),
                index,
            });
        }

        let (status, proof) = match dead_proof {
            Some(proof) => (DetectionStatus::DeadHost, proof.clone()),
            None => {
                let status = DetectionStatus::from_vendor(&finding.status, finding.kind)
                    .ok_or_else(|| ExpandError::UnknownStatus {
                        host: device.id.clone(),
                        vulnerability_id: vulnerability_id.to_string(),
                        status: finding.status.clone(),
                    })?;
                (status, finding.proof.clone())
            }
        };

        events.push(DetectionEvent {
            device: device.clone(),
            vulnerability: VulnerabilityRef {
                id: vulnerability_id.to_string(),
            },
            status,
            proof,
            first_found: finding.first_found,
            last_found: finding.last_found,
            times_seen: finding.times_found,
            port: finding.port,
            protocol: finding.protocol.clone(),
        });
    }

    debug!(host = %device.id, events = events.len(), dead = dead_proof.is_some(), "expanded host");
    Ok(events)
}
