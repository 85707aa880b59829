//! Scenario report written at the end of a run.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Test case identifier used by the reporting pipeline
pub const REPORT_ID: &str = "75325";

pub const SCENARIO_NAME: &str =
    "should add leap event announcement in leap configmap when removing the last announcement";

pub const LABEL_LEAP_FILE: &str = "leapfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
}

/// What happened to one node's leap record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub node: String,
    /// Announcement line stripped from the record, if there was one
    pub removed: Option<String>,
    /// Announcement extracted from the stripped record
    pub before: String,
    /// Announcement extracted from the regenerated record
    pub after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub status: ScenarioStatus,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub nodes: Vec<NodeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Collects timing while a scenario runs.
pub struct ReportBuilder {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ReportBuilder {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn finish(self, nodes: Vec<NodeOutcome>, failure: Option<String>) -> ScenarioReport {
        let status = if failure.is_some() {
            ScenarioStatus::Failed
        } else {
            ScenarioStatus::Passed
        };

        ScenarioReport {
            id: REPORT_ID.to_string(),
            name: SCENARIO_NAME.to_string(),
            labels: vec![LABEL_LEAP_FILE.to_string()],
            status,
            started_at: self.started_at,
            duration_secs: self.started.elapsed().as_secs_f64(),
            nodes,
            failure,
        }
    }
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_report_serialization() {
        let report = ReportBuilder::start().finish(
            vec![NodeOutcome {
                node: "worker-0".to_string(),
                removed: Some("3692217600 37 # 28 Dec 2016".to_string()),
                before: "3644697600 36 # 1 Jul 2015".to_string(),
                after: "3927775672 37 # 19 Jun 2024".to_string(),
            }],
            None,
        );

        assert!(report.passed());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], "75325");
        assert_eq!(json["status"], "passed");
        assert_eq!(json["labels"][0], "leapfile");
        assert_eq!(json["nodes"][0]["node"], "worker-0");
        assert!(json.get("failure").is_none());
    }

    #[test]
    fn test_failed_report() {
        let report = ReportBuilder::start().finish(Vec::new(), Some("boom".to_string()));

        assert!(!report.passed());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure"], "boom");
    }
}
