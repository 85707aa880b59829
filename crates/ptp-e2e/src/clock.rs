//! PTP clock state assertions.
//!
//! linuxptp-daemon exports the synchronization state of every clock it
//! manages as the `openshift_ptp_clock_state` gauge. The scenario only starts
//! (and only finishes) once every exported clock has been locked for a while.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::prometheus::{MetricSample, PrometheusClient};

/// Gauge exported by linuxptp-daemon for each clock
pub const CLOCK_STATE_METRIC: &str = "openshift_ptp_clock_state";

/// Synchronization state of a PTP clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Freerun,
    Locked,
    Holdover,
}

impl ClockState {
    /// Map a gauge value to a state, `None` for values the daemon never exports.
    pub fn from_value(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }

        match value.round() as i64 {
            0 => Some(Self::Freerun),
            1 => Some(Self::Locked),
            2 => Some(Self::Holdover),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Self::Freerun => 0.0,
            Self::Locked => 1.0,
            Self::Holdover => 2.0,
        }
    }
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Freerun => write!(f, "FREERUN"),
            Self::Locked => write!(f, "LOCKED"),
            Self::Holdover => write!(f, "HOLDOVER"),
        }
    }
}

/// Timing for a clock state assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssertOptions {
    /// How long every sample must stay in the expected state
    pub stable_for: Duration,
    /// Overall deadline
    pub timeout: Duration,
    /// Time between queries
    pub poll_interval: Duration,
}

impl Default for AssertOptions {
    fn default() -> Self {
        Self {
            stable_for: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Source of clock state assertions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClockMonitor: Send + Sync {
    /// Wait until every clock reports `expected` for `options.stable_for`.
    async fn assert_clock_state(&self, expected: ClockState, options: &AssertOptions) -> Result<()>;
}

/// True when there is at least one sample and all of them are in `expected`.
pub fn all_in_state(samples: &[MetricSample], expected: ClockState) -> bool {
    !samples.is_empty()
        && samples
            .iter()
            .all(|sample| ClockState::from_value(sample.value) == Some(expected))
}

fn describe(samples: &[MetricSample]) -> String {
    if samples.is_empty() {
        return "no samples".to_string();
    }

    samples
        .iter()
        .map(|sample| {
            let node = sample
                .labels
                .get("node")
                .map_or("unknown", String::as_str);
            let state = ClockState::from_value(sample.value)
                .map_or_else(|| format!("{}", sample.value), |state| state.to_string());
            format!("{node}={state}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl ClockMonitor for PrometheusClient {
    async fn assert_clock_state(&self, expected: ClockState, options: &AssertOptions) -> Result<()> {
        let start = Instant::now();
        let mut stable_since: Option<Instant> = None;
        let mut last_seen = String::from("no samples");

        info!(
            expected = %expected,
            stable_secs = options.stable_for.as_secs(),
            timeout_secs = options.timeout.as_secs(),
            "Waiting for clock state"
        );

        loop {
            match self.query(CLOCK_STATE_METRIC).await {
                Ok(samples) if all_in_state(&samples, expected) => {
                    let since = *stable_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= options.stable_for {
                        info!(expected = %expected, clocks = samples.len(), "Clock state is stable");
                        return Ok(());
                    }
                    last_seen = describe(&samples);
                }
                Ok(samples) => {
                    stable_since = None;
                    last_seen = describe(&samples);
                    debug!(expected = %expected, observed = %last_seen, "Clock state not reached");
                }
                Err(e) => {
                    stable_since = None;
                    warn!(error = %e, "Failed to query clock state");
                }
            }

            if start.elapsed() >= options.timeout {
                anyhow::bail!(
                    "Timeout after {:?} waiting for clock state {expected} (last observed: {last_seen})",
                    options.timeout
                );
            }

            tokio::time::sleep(options.poll_interval).await;
        }
    }
}
