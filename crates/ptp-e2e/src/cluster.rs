//! Kubernetes access for the leap scenario.
//!
//! The scenario talks to the cluster only through [`PtpCluster`], so tests can
//! substitute a mock and the real client is created once per run and passed in.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use leapfile::LeapRecords;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;

const POD_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Cluster operations the leap scenario depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PtpCluster: Send + Sync {
    /// Data of the leap ConfigMap, keyed by node name.
    async fn leap_records(&self) -> Result<LeapRecords>;

    /// Replace the leap record of a single node.
    async fn write_leap_record(&self, node: &str, record: &str) -> Result<()>;

    /// Drop all leap records so the daemon writes fresh ones.
    async fn clear_leap_records(&self) -> Result<()>;

    /// Nodes running a linuxptp-daemon pod, sorted.
    async fn daemon_nodes(&self) -> Result<Vec<String>>;

    /// Delete every daemon pod, optionally waiting until they are gone.
    /// Returns the number of pods deleted.
    async fn delete_daemon_pods(&self, wait: Option<Duration>) -> Result<usize>;

    /// Wait until every pod in the namespace is healthy.
    async fn wait_for_pods_healthy(&self, timeout: Duration) -> Result<()>;
}

/// Create a Kubernetes client from a kubeconfig path, or from the
/// environment when no path is given.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("Failed to create Kubernetes client");
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig from {}", path.display()))?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to create Kubernetes config from kubeconfig")?;

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// A pod counts as healthy once it completed, or is running with every
/// container ready. Pods being deleted never count.
pub fn pod_is_healthy(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }

    let Some(status) = pod.status.as_ref() else {
        return false;
    };

    match status.phase.as_deref() {
        Some("Succeeded") => true,
        Some("Running") => status.conditions.as_ref().is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        }),
        _ => false,
    }
}

/// Distinct node names the given pods are scheduled on.
pub fn scheduled_nodes(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .filter_map(|pod| pod.spec.as_ref()?.node_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// [`PtpCluster`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubePtpCluster {
    client: Client,
    namespace: String,
    leap_configmap: String,
    daemon_selector: String,
}

impl KubePtpCluster {
    pub fn new(client: Client, config: &ScenarioConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            leap_configmap: config.leap_configmap.clone(),
            daemon_selector: config.daemon_selector.clone(),
        }
    }

    fn configmaps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn daemon_pods(&self) -> Result<Vec<Pod>> {
        let pods = self
            .pods()
            .list(&ListParams::default().labels(&self.daemon_selector))
            .await
            .with_context(|| {
                format!(
                    "Failed to list pods matching {} in {}",
                    self.daemon_selector, self.namespace
                )
            })?;

        Ok(pods.items)
    }

    async fn wait_for_pod_removed(
        &self,
        name: &str,
        uid: Option<&str>,
        deadline: Instant,
    ) -> Result<()> {
        loop {
            match self.pods().get(name).await {
                Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
                Ok(pod) if pod.metadata.uid.as_deref() != uid => return Ok(()),
                Ok(_) => debug!(pod = %name, "Pod still terminating"),
                Err(e) => warn!(pod = %name, error = %e, "Failed to get pod"),
            }

            if Instant::now() >= deadline {
                return Err(anyhow!("Timeout waiting for pod {}/{name} to be deleted", self.namespace));
            }

            tokio::time::sleep(POD_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PtpCluster for KubePtpCluster {
    async fn leap_records(&self) -> Result<LeapRecords> {
        let cm = self
            .configmaps()
            .get(&self.leap_configmap)
            .await
            .with_context(|| format!("Failed to pull ConfigMap {}/{}", self.namespace, self.leap_configmap))?;

        Ok(cm.data.unwrap_or_default())
    }

    async fn write_leap_record(&self, node: &str, record: &str) -> Result<()> {
        let patch = json!({ "data": BTreeMap::from([(node, record)]) });

        self.configmaps()
            .patch(&self.leap_configmap, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to update leap record for node {node}"))?;

        info!(node = %node, configmap = %self.leap_configmap, "Updated leap record");
        Ok(())
    }

    async fn clear_leap_records(&self) -> Result<()> {
        let api = self.configmaps();
        let mut cm = api
            .get(&self.leap_configmap)
            .await
            .with_context(|| format!("Failed to pull ConfigMap {}/{}", self.namespace, self.leap_configmap))?;

        cm.data = Some(BTreeMap::new());

        api.replace(&self.leap_configmap, &PostParams::default(), &cm)
            .await
            .context("Failed to clear leap ConfigMap")?;

        info!(configmap = %self.leap_configmap, "Cleared leap records");
        Ok(())
    }

    async fn daemon_nodes(&self) -> Result<Vec<String>> {
        let pods = self.daemon_pods().await?;
        Ok(scheduled_nodes(&pods))
    }

    async fn delete_daemon_pods(&self, wait: Option<Duration>) -> Result<usize> {
        let pods = self.daemon_pods().await?;
        let api = self.pods();
        let mut deleted = Vec::new();

        for pod in &pods {
            let Some(name) = pod.metadata.name.as_deref() else {
                continue;
            };

            match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => info!(pod = %name, "Deleted daemon pod"),
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    debug!(pod = %name, "Daemon pod already gone");
                }
                Err(e) => return Err(anyhow!("Failed to delete pod {}/{name}: {e}", self.namespace)),
            }

            deleted.push((name, pod.metadata.uid.as_deref()));
        }

        if let Some(timeout) = wait {
            let deadline = Instant::now() + timeout;
            for (name, uid) in &deleted {
                self.wait_for_pod_removed(name, *uid, deadline).await?;
            }
        }

        Ok(deleted.len())
    }

    async fn wait_for_pods_healthy(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        info!(
            namespace = %self.namespace,
            timeout_secs = timeout.as_secs(),
            "Waiting for pods to be healthy"
        );

        loop {
            match self.pods().list(&ListParams::default()).await {
                Ok(pods) => {
                    let unhealthy: Vec<&str> = pods
                        .items
                        .iter()
                        .filter(|pod| !pod_is_healthy(pod))
                        .filter_map(|pod| pod.metadata.name.as_deref())
                        .collect();

                    if !pods.items.is_empty() && unhealthy.is_empty() {
                        info!(pods = pods.items.len(), "All pods healthy");
                        return Ok(());
                    }

                    debug!(unhealthy = ?unhealthy, "Pods not healthy yet");
                }
                Err(e) => warn!(error = %e, "Failed to list pods"),
            }

            if start.elapsed() >= timeout {
                return Err(anyhow!(
                    "Timeout waiting for pods in {} to be healthy",
                    self.namespace
                ));
            }

            tokio::time::sleep(POD_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    fn running(name: &str, node: &str, ready: &str) -> Pod {
        pod(json!({
            "metadata": { "name": name },
            "spec": { "nodeName": node, "containers": [] },
            "status": {
                "phase": "Running",
                "conditions": [{ "type": "Ready", "status": ready }]
            }
        }))
    }

    #[test]
    fn test_running_and_ready_is_healthy() {
        assert!(pod_is_healthy(&running("linuxptp-daemon-abc", "worker-0", "True")));
        assert!(!pod_is_healthy(&running("linuxptp-daemon-abc", "worker-0", "False")));
    }

    #[test]
    fn test_completed_pod_is_healthy() {
        let completed = pod(json!({
            "metadata": { "name": "job" },
            "status": { "phase": "Succeeded" }
        }));
        assert!(pod_is_healthy(&completed));
    }

    #[test]
    fn test_pending_or_terminating_is_unhealthy() {
        let pending = pod(json!({
            "metadata": { "name": "p" },
            "status": { "phase": "Pending" }
        }));
        let no_status = pod(json!({ "metadata": { "name": "n" } }));
        let mut terminating = running("t", "worker-0", "True");
        terminating.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );

        assert!(!pod_is_healthy(&pending));
        assert!(!pod_is_healthy(&no_status));
        assert!(!pod_is_healthy(&terminating));
    }

    #[test]
    fn test_scheduled_nodes_sorted_and_distinct() {
        let pods = [
            running("a", "worker-1", "True"),
            running("b", "worker-0", "True"),
            running("c", "worker-1", "False"),
            pod(json!({ "metadata": { "name": "unscheduled" } })),
        ];

        assert_eq!(scheduled_nodes(&pods), vec!["worker-0", "worker-1"]);
    }
}
