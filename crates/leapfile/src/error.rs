//! Error types for leap record handling.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while reading or waiting on leap records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeapError {
    /// No announcement block flanked by blank lines was found
    #[error("error finding the last announcement")]
    AnnouncementNotFound,

    /// A line could not be parsed as a leap announcement
    #[error("invalid leap announcement: {0:?}")]
    InvalidAnnouncement(String),

    /// Polling gave up before any record contained the marker
    #[error("timed out after {timeout:?} ({attempts} attempts) waiting for leap records to contain {marker:?}")]
    Timeout {
        timeout: Duration,
        attempts: u32,
        marker: String,
    },
}

pub type Result<T> = std::result::Result<T, LeapError>;
