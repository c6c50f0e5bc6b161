use serde::{Deserialize, Serialize};

/// The sync state istiod reports for one proxy on its `/debug/syncz` endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SyncStatus {
    #[serde(rename = "proxy", default)]
    pub proxy_id: String,
    #[serde(default)]
    pub cluster_sent: String,
    #[serde(default)]
    pub cluster_acked: String,
    #[serde(default)]
    pub listener_sent: String,
    #[serde(default)]
    pub listener_acked: String,
    #[serde(default)]
    pub route_sent: String,
    #[serde(default)]
    pub route_acked: String,
    #[serde(default)]
    pub endpoint_sent: String,
    #[serde(default)]
    pub endpoint_acked: String,
}

/// Per-xDS sync state of a pod's sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ProxyStatus {
    pub cds: String,
    pub eds: String,
    pub lds: String,
    pub rds: String,
}

pub const SYNCED: &str = "Synced";
pub const NOT_SENT: &str = "NOT_SENT";
pub const STALE: &str = "STALE";

fn xds_status(sent: &str, acked: &str) -> &'static str {
    if sent.is_empty() {
        NOT_SENT
    } else if sent == acked {
        SYNCED
    } else {
        STALE
    }
}

impl From<&SyncStatus> for ProxyStatus {
    fn from(sync: &SyncStatus) -> Self {
        Self {
            cds: xds_status(&sync.cluster_sent, &sync.cluster_acked).to_string(),
            eds: xds_status(&sync.endpoint_sent, &sync.endpoint_acked).to_string(),
            lds: xds_status(&sync.listener_sent, &sync.listener_acked).to_string(),
            rds: xds_status(&sync.route_sent, &sync.route_acked).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_nonces_to_status() {
        let sync: SyncStatus = serde_json::from_value(serde_json::json!({
            "proxy": "details-v1-5b4f.bookinfo",
            "cluster_sent": "abc",
            "cluster_acked": "abc",
            "listener_sent": "def",
            "listener_acked": "xyz",
            "route_acked": "ghi",
        }))
        .unwrap();
        assert_eq!(sync.proxy_id, "details-v1-5b4f.bookinfo");

        let status = ProxyStatus::from(&sync);
        assert_eq!(status.cds, SYNCED);
        assert_eq!(status.lds, STALE);
        assert_eq!(status.rds, NOT_SENT);
        assert_eq!(status.eds, NOT_SENT);
    }
}
