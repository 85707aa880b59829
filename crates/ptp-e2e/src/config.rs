//! Scenario configuration.
//!
//! Every setting can come from a flag or an environment variable; defaults
//! match an OpenShift cluster running the PTP operator.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use leapfile::PollSettings;

use crate::clock::AssertOptions;

/// Thanos querier service reachable from inside the cluster
pub const DEFAULT_PROMETHEUS_URL: &str =
    "https://thanos-querier.openshift-monitoring.svc.cluster.local:9091";

/// Settings for the leap file scenario
#[derive(Debug, Clone, Args)]
pub struct ScenarioConfig {
    /// Path to a kubeconfig file (defaults to in-cluster or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace of the PTP operator and linuxptp-daemon pods
    #[arg(long, env = "PTP_NAMESPACE", default_value = "openshift-ptp", global = true)]
    pub namespace: String,

    /// Name of the leap ConfigMap
    #[arg(long, env = "PTP_LEAP_CONFIGMAP", default_value = "leap-configmap", global = true)]
    pub leap_configmap: String,

    /// Label selector matching linuxptp-daemon pods
    #[arg(long, env = "PTP_DAEMON_SELECTOR", default_value = "app=linuxptp-daemon", global = true)]
    pub daemon_selector: String,

    /// Base URL of the Prometheus (or Thanos) query API
    #[arg(long, env = "PROMETHEUS_URL", default_value = DEFAULT_PROMETHEUS_URL, global = true)]
    pub prometheus_url: String,

    /// Bearer token for the Prometheus API
    #[arg(long, env = "PROMETHEUS_TOKEN", hide_env_values = true, global = true)]
    pub prometheus_token: Option<String>,

    /// Skip TLS certificate verification for the Prometheus API
    #[arg(long, env = "PROMETHEUS_INSECURE", global = true)]
    pub prometheus_insecure: bool,

    /// Seconds between leap ConfigMap polls
    #[arg(long, default_value = "5", global = true)]
    pub update_interval: u64,

    /// Seconds to wait for the daemon to rewrite the leap ConfigMap
    #[arg(long, default_value = "600", global = true)]
    pub update_timeout: u64,

    /// Seconds to wait for daemon pods to be deleted or become healthy
    #[arg(long, default_value = "300", global = true)]
    pub pod_timeout: u64,

    /// Seconds the clock state must stay unchanged to count as stable
    #[arg(long, default_value = "10", global = true)]
    pub clock_stable: u64,

    /// Seconds to wait for the clock state to stabilize
    #[arg(long, default_value = "300", global = true)]
    pub clock_timeout: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            namespace: "openshift-ptp".to_string(),
            leap_configmap: "leap-configmap".to_string(),
            daemon_selector: "app=linuxptp-daemon".to_string(),
            prometheus_url: DEFAULT_PROMETHEUS_URL.to_string(),
            prometheus_token: None,
            prometheus_insecure: false,
            update_interval: 5,
            update_timeout: 600,
            pod_timeout: 300,
            clock_stable: 10,
            clock_timeout: 300,
        }
    }
}

impl ScenarioConfig {
    /// Polling used while waiting for the regenerated leap records
    pub fn update_poll(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.update_interval),
            timeout: Duration::from_secs(self.update_timeout),
        }
    }

    pub fn pod_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_timeout)
    }

    /// Stability window and timeout for clock state assertions
    pub fn clock_assert(&self) -> AssertOptions {
        AssertOptions {
            stable_for: Duration::from_secs(self.clock_stable),
            timeout: Duration::from_secs(self.clock_timeout),
            ..AssertOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ScenarioConfig,
    }

    #[test]
    fn test_default_matches_cli_defaults() {
        let parsed = TestCli::parse_from(["test"]).config;
        let defaults = ScenarioConfig::default();

        // env-backed fields may be set on the host running the tests
        assert_eq!(parsed.update_interval, defaults.update_interval);
        assert_eq!(parsed.update_timeout, defaults.update_timeout);
        assert_eq!(parsed.pod_timeout, defaults.pod_timeout);
        assert_eq!(parsed.clock_stable, defaults.clock_stable);
        assert_eq!(parsed.clock_timeout, defaults.clock_timeout);
    }

    #[test]
    fn test_durations() {
        let config = TestCli::parse_from([
            "test",
            "--update-interval",
            "2",
            "--update-timeout",
            "30",
            "--clock-stable",
            "1",
            "--clock-timeout",
            "4",
            "--pod-timeout",
            "9",
        ])
        .config;

        assert_eq!(
            config.update_poll(),
            PollSettings {
                interval: Duration::from_secs(2),
                timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(config.pod_timeout(), Duration::from_secs(9));

        let clock = config.clock_assert();
        assert_eq!(clock.stable_for, Duration::from_secs(1));
        assert_eq!(clock.timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_overrides() {
        let config = TestCli::parse_from([
            "test",
            "--namespace",
            "ptp",
            "--leap-configmap",
            "leap",
            "--daemon-selector",
            "app=ptp",
        ])
        .config;

        assert_eq!(config.namespace, "ptp");
        assert_eq!(config.leap_configmap, "leap");
        assert_eq!(config.daemon_selector, "app=ptp");
    }
}
