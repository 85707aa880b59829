//! Leap file scenario.
//!
//! Strips the last leap announcement from every node's record, restarts
//! linuxptp-daemon and checks that the daemon writes an announcement dated
//! today. The cluster and metrics handles are owned by the scenario value, so
//! each run gets its own clients.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use leapfile::{
    announcement_lines, extract_announcement, remove_last_announcement_line, today_marker,
    wait_until_updated, PollSettings,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::{AssertOptions, ClockMonitor, ClockState};
use crate::cluster::PtpCluster;
use crate::config::ScenarioConfig;
use crate::report::{NodeOutcome, ReportBuilder, ScenarioReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("no nodes are running linuxptp-daemon")]
    NoDaemonNodes,

    #[error("leap ConfigMap has no record for any daemon node")]
    NoLeapRecords,

    #[error("last announcement for node {node} did not change: {announcement:?}")]
    AnnouncementUnchanged { node: String, announcement: String },
}

/// Timing knobs for one scenario run
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSettings {
    pub update: PollSettings,
    pub pod_timeout: Duration,
    pub clock: AssertOptions,
}

impl From<&ScenarioConfig> for ScenarioSettings {
    fn from(config: &ScenarioConfig) -> Self {
        Self {
            update: config.update_poll(),
            pod_timeout: config.pod_timeout(),
            clock: config.clock_assert(),
        }
    }
}

/// Stripped record written for a node, kept as the comparison baseline
struct Baseline {
    removed: Option<String>,
    stripped: String,
}

pub struct LeapFileScenario<C, M> {
    cluster: C,
    clock: M,
    settings: ScenarioSettings,
}

impl<C: PtpCluster, M: ClockMonitor> LeapFileScenario<C, M> {
    pub fn new(cluster: C, clock: M, settings: ScenarioSettings) -> Self {
        Self {
            cluster,
            clock,
            settings,
        }
    }

    /// Make sure every clock is locked before touching the leap data.
    pub async fn setup(&self) -> Result<()> {
        info!("Ensuring clocks are locked before testing");
        self.clock
            .assert_clock_state(ClockState::Locked, &self.settings.clock)
            .await
            .context("Failed to assert clock state is locked")
    }

    /// Remove the last announcement per node, restart the daemon and verify
    /// every node got a new announcement.
    pub async fn run(&self) -> Result<Vec<NodeOutcome>> {
        info!("Pulling leap ConfigMap");
        let records = self.cluster.leap_records().await?;

        let nodes = self
            .cluster
            .daemon_nodes()
            .await
            .context("Failed to get daemon nodes")?;
        if nodes.is_empty() {
            return Err(ScenarioError::NoDaemonNodes.into());
        }

        let mut baselines = BTreeMap::new();
        for node in nodes {
            let Some(record) = records.get(&node) else {
                warn!(node = %node, "No leap record for node, skipping");
                continue;
            };

            info!(node = %node, "Removing the last leap announcement");
            let removed = announcement_lines(record).last().map(str::to_string);
            let stripped = remove_last_announcement_line(record);
            self.cluster.write_leap_record(&node, &stripped).await?;

            baselines.insert(node, Baseline { removed, stripped });
        }

        if baselines.is_empty() {
            return Err(ScenarioError::NoLeapRecords.into());
        }

        info!("Deleting all linuxptp-daemon pods");
        let deleted = self.cluster.delete_daemon_pods(None).await?;
        info!(pods = deleted, "Waiting for pods to be healthy");
        self.cluster
            .wait_for_pods_healthy(self.settings.pod_timeout)
            .await
            .context("Failed to wait for pods to be healthy")?;

        info!("Waiting for leap ConfigMap to carry today's announcement");
        let updated = wait_until_updated(
            || self.cluster.leap_records(),
            today_marker,
            self.settings.update,
        )
        .await
        .context("Failed to wait for leap ConfigMap to be updated")?;

        let mut outcomes = Vec::with_capacity(baselines.len());
        for (node, baseline) in baselines {
            // the stripped record may no longer hold a complete block
            let before = extract_announcement(&baseline.stripped)
                .unwrap_or_default()
                .to_string();
            let after = extract_announcement(updated.get(&node).map_or("", String::as_str))
                .with_context(|| format!("Failed to get last announcement for node {node}"))?
                .to_string();

            if before == after {
                return Err(ScenarioError::AnnouncementUnchanged {
                    node,
                    announcement: after,
                }
                .into());
            }

            info!(node = %node, before = %before, after = %after, "Leap announcement regenerated");
            outcomes.push(NodeOutcome {
                node,
                removed: baseline.removed,
                before,
                after,
            });
        }

        Ok(outcomes)
    }

    /// Restore the leap ConfigMap and wait for the clocks to lock again.
    pub async fn teardown(&self) -> Result<()> {
        info!("Restoring the original leap ConfigMap");
        self.cluster.clear_leap_records().await?;

        let deleted = self
            .cluster
            .delete_daemon_pods(Some(self.settings.pod_timeout))
            .await?;
        info!(pods = deleted, "Daemon pods restarted");

        info!("Ensuring clocks are locked after testing");
        self.clock
            .assert_clock_state(ClockState::Locked, &self.settings.clock)
            .await
            .context("Failed to assert clock state is locked")
    }

    /// Setup, run and teardown. Teardown runs even when an earlier step fails;
    /// the report carries the first failure.
    pub async fn execute(&self) -> ScenarioReport {
        let report = ReportBuilder::start();

        let outcome = match self.setup().await {
            Ok(()) => self.run().await,
            Err(e) => Err(e),
        };
        let teardown = self.teardown().await;

        let (nodes, mut failure) = match outcome {
            Ok(nodes) => (nodes, None),
            Err(e) => {
                error!(error = %format!("{e:#}"), "Leap file scenario failed");
                (Vec::new(), Some(format!("{e:#}")))
            }
        };

        if let Err(e) = teardown {
            error!(error = %format!("{e:#}"), "Leap file scenario teardown failed");
            failure.get_or_insert_with(|| format!("teardown: {e:#}"));
        }

        report.finish(nodes, failure)
    }
}
