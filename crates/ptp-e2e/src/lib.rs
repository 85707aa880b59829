//! # ptp-e2e
//!
//! End-to-end check of linuxptp-daemon's leap-second handling on a
//! Kubernetes cluster running the PTP operator.
//!
//! - [`cluster`]: leap ConfigMap and daemon pod access
//! - [`prometheus`] and [`clock`]: PTP clock state assertions
//! - [`scenario`]: the leap file scenario itself
//! - [`report`]: JSON report of a scenario run

pub mod clock;
pub mod cluster;
pub mod config;
pub mod prometheus;
pub mod report;
pub mod scenario;

pub use clock::{AssertOptions, ClockMonitor, ClockState};
pub use cluster::{KubePtpCluster, PtpCluster};
pub use config::ScenarioConfig;
pub use prometheus::{PrometheusClient, PrometheusConfig};
pub use report::{NodeOutcome, ScenarioReport, ScenarioStatus};
pub use scenario::{LeapFileScenario, ScenarioError, ScenarioSettings};
