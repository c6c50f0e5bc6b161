use crate::{
    core::{proxy::SyncStatus, ProxyStatuses, Result},
    k8s::Client,
};
use anyhow::Context;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::time::{Duration, Instant};

type Snapshot = Arc<HashMap<String, SyncStatus>>;

/// Reads proxy sync state from istiod's debug endpoint, reached through the
/// API server's service proxy.
///
/// The endpoint reports every proxy at once, so a snapshot is kept for `ttl`
/// and shared by all lookups made in that window.
pub struct IstiodProxyStatuses {
    client: Client,
    path: String,
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, Snapshot)>>,
}

// === impl IstiodProxyStatuses ===

impl IstiodProxyStatuses {
    pub fn new(client: Client, namespace: &str, service: &str, port: u16, ttl: Duration) -> Self {
        Self {
            client,
            path: format!("/api/v1/namespaces/{namespace}/services/{service}:{port}/proxy/debug/syncz"),
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let fresh = self
            .snapshot
            .lock()
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, snapshot)| snapshot.clone());
        if let Some(snapshot) = fresh {
            return Ok(snapshot);
        }

        let req = http::Request::get(&self.path)
            .body(Vec::new())
            .context("invalid syncz request")?;
        let body = self
            .client
            .request_text(req)
            .await
            .context("failed to fetch istiod sync status")?;
        let snapshot = Arc::new(index_statuses(&body)?);
        *self.snapshot.lock() = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl ProxyStatuses for IstiodProxyStatuses {
    async fn get_pod_proxy_status(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<SyncStatus>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.get(&format!("{pod}.{namespace}")).cloned())
    }
}

/// Indexes a syncz response by proxy ID, i.e. `<pod>.<namespace>`.
fn index_statuses(body: &str) -> Result<HashMap<String, SyncStatus>> {
    let statuses = serde_json::from_str::<Vec<SyncStatus>>(body)
        .context("failed to decode istiod sync status")?;
    Ok(statuses
        .into_iter()
        .map(|s| (s.proxy_id.clone(), s))
        .collect())
}
