//! Polling for regenerated leap records.
//!
//! After the leap data is edited and the daemon restarted, linuxptp-daemon
//! rewrites the records with an announcement carrying the current date. The
//! waiter re-reads the records until one of them mentions that date.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{LeapError, Result};

/// Leap records keyed by node name, as stored in the ConfigMap data.
pub type LeapRecords = BTreeMap<String, String>;

/// Interval and overall timeout for [`wait_until_updated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Renders `at` the way the daemon writes announcement dates, e.g. `5 Jun 2024`.
pub fn date_marker(at: DateTime<Utc>) -> String {
    at.format("%-d %b %Y").to_string()
}

/// Today's UTC date as an announcement date marker.
pub fn today_marker() -> String {
    date_marker(Utc::now())
}

/// Polls `fetch` until any record contains the string produced by `marker`.
///
/// The first fetch runs immediately, later ones every `settings.interval`.
/// `marker` is evaluated again before each fetch so a wait that crosses
/// midnight looks for the new date. Fetch errors are logged and retried; only
/// the overall timeout ends the wait unsuccessfully.
///
/// On success the records from the matching fetch are returned.
pub async fn wait_until_updated<F, Fut, E, M>(
    mut fetch: F,
    marker: M,
    settings: PollSettings,
) -> Result<LeapRecords>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<LeapRecords, E>>,
    E: fmt::Display,
    M: Fn() -> String,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    info!(
        interval_secs = settings.interval.as_secs(),
        timeout_secs = settings.timeout.as_secs(),
        "Waiting for leap records to be updated"
    );

    loop {
        attempts += 1;
        let wanted = marker();

        match fetch().await {
            Ok(records) => {
                if let Some(key) = records
                    .iter()
                    .find_map(|(key, record)| record.contains(&wanted).then_some(key))
                {
                    info!(key = %key, marker = %wanted, attempts, "Leap record updated");
                    return Ok(records);
                }
                debug!(marker = %wanted, attempts, "Leap records not updated yet");
            }
            Err(e) => {
                warn!(error = %e, attempts, "Failed to fetch leap records, retrying");
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            return Err(LeapError::Timeout {
                timeout: settings.timeout,
                attempts,
                marker: wanted,
            });
        }

        tokio::time::sleep(settings.interval.min(settings.timeout - elapsed)).await;
    }
}
