//! # leapfile
//!
//! Helpers for the leap-second data that linuxptp-daemon keeps per node in
//! its leap ConfigMap. Each node's record follows the `leap-seconds.list`
//! layout: comment lines plus announcement lines such as
//!
//! ```text
//! 3692217600 37 # 28 Dec 2016
//! ```
//!
//! The crate provides:
//! - [`extract_announcement`]: pull the announcement block out of a record
//! - [`remove_last_announcement_line`]: drop the announcement line nearest the end
//! - [`wait_until_updated`]: poll a record source until it mentions a date marker
//! - [`Announcement`]: typed view of one announcement line

pub mod announcement;
pub mod error;
pub mod waiter;

pub use announcement::{
    announcement_lines, count_announcement_lines, extract_announcement,
    remove_last_announcement_line, Announcement,
};
pub use error::{LeapError, Result};
pub use waiter::{date_marker, today_marker, wait_until_updated, PollSettings, LeapRecords};
