//! Leap announcement lines.
//!
//! An announcement line carries an NTP-epoch timestamp, the TAI-UTC offset
//! that applies from then on, and a human readable date comment:
//!
//! ```text
//! 3692217600 37 # 28 Dec 2016
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::error::{LeapError, Result};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Announcement line preceded by a newline and followed by a blank line.
static ANNOUNCEMENT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)\n(\d+\s+\d+\s+#\s\d+\s[a-zA-Z]+\s\d{4})\n\n").unwrap()
});

/// Prefix shared by every announcement line.
static ANNOUNCEMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^\s*\d+\s+\d+\s+#").unwrap());

static ANNOUNCEMENT_FIELDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)^\s*(\d+)\s+(\d+)\s+#\s*(\d{1,2}\s+[A-Za-z]+\s+\d{4})\s*$").unwrap()
});

/// Returns the announcement line of the first announcement block in `record`.
///
/// An empty record is passed through as an empty announcement. Only the first
/// block counting from the start of the text is considered, so a record with
/// several blank-line separated announcements yields the earliest one.
pub fn extract_announcement(record: &str) -> Result<&str> {
    if record.is_empty() {
        return Ok(record);
    }

    ANNOUNCEMENT_BLOCK
        .captures(record)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(LeapError::AnnouncementNotFound)
}

/// Removes the announcement line closest to the end of `record`.
///
/// Lines are split and rejoined on `\n` so everything else, blank lines and
/// carriage returns included, comes back untouched. Records without any
/// announcement line are returned as-is.
pub fn remove_last_announcement_line(record: &str) -> String {
    let mut lines: Vec<&str> = record.split('\n').collect();

    if let Some(index) = lines
        .iter()
        .rposition(|line| ANNOUNCEMENT_LINE.is_match(line))
    {
        lines.remove(index);
    }

    lines.join("\n")
}

/// Iterates over every line of `record` that looks like an announcement.
pub fn announcement_lines(record: &str) -> impl Iterator<Item = &str> {
    record
        .split('\n')
        .filter(|line| ANNOUNCEMENT_LINE.is_match(line))
}

pub fn count_announcement_lines(record: &str) -> usize {
    announcement_lines(record).count()
}

/// A parsed leap announcement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Announcement {
    /// Seconds since the NTP epoch
    pub ntp_seconds: u64,
    /// TAI-UTC offset in seconds
    pub tai_offset: u32,
    /// Date from the trailing comment
    pub date: NaiveDate,
}

impl Announcement {
    /// The announced instant in UTC, `None` if it cannot be represented.
    pub fn effective_at(&self) -> Option<DateTime<Utc>> {
        let ntp = i64::try_from(self.ntp_seconds).ok()?;
        DateTime::from_timestamp(ntp - NTP_UNIX_OFFSET, 0)
    }
}

impl FromStr for Announcement {
    type Err = LeapError;

    fn from_str(line: &str) -> Result<Self> {
        let invalid = || LeapError::InvalidAnnouncement(line.to_string());

        let caps = ANNOUNCEMENT_FIELDS.captures(line).ok_or_else(invalid)?;
        let ntp_seconds = caps[1].parse().map_err(|_| invalid())?;
        let tai_offset = caps[2].parse().map_err(|_| invalid())?;
        let date = NaiveDate::parse_from_str(&caps[3], "%d %b %Y").map_err(|_| invalid())?;

        Ok(Self {
            ntp_seconds,
            tai_offset,
            date,
        })
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} # {}",
            self.ntp_seconds,
            self.tai_offset,
            self.date.format("%-d %b %Y")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#\tUpdated through IERS Bulletin C 62\n\
                          #\tFile expires on:  28 December 2022\n\
                          #@\t3881174400\n\
                          \n\
                          2272060800 10 # 1 Jan 1972\n\
                          2287785600 11 # 1 Jul 1972\n\
                          3692217600 37 # 28 Dec 2016\n\
                          \n\
                          #h\t16edd3d2 ad1d53d0 3f5f2d3c 7a1e1f7e 4a2c1f4d\n";

    #[test]
    fn test_extract_returns_block_line() {
        assert_eq!(
            extract_announcement(SAMPLE),
            Ok("3692217600 37 # 28 Dec 2016")
        );
    }

    #[test]
    fn test_extract_inline_example() {
        let record = "header\n3692217600 37 # 28 Dec 2016\n\nfooter";
        assert_eq!(
            extract_announcement(record),
            Ok("3692217600 37 # 28 Dec 2016")
        );
    }

    #[test]
    fn test_extract_empty_passthrough() {
        assert_eq!(extract_announcement(""), Ok(""));
    }

    #[test]
    fn test_extract_not_found() {
        assert_eq!(
            extract_announcement("# comments only\n\n# nothing else\n"),
            Err(LeapError::AnnouncementNotFound)
        );
        // no blank line after the announcement
        assert_eq!(
            extract_announcement("x\n3692217600 37 # 28 Dec 2016\nfooter"),
            Err(LeapError::AnnouncementNotFound)
        );
    }

    #[test]
    fn test_extract_takes_first_block() {
        let record = "header\n\n100 37 # 1 Jan 2017\n\n200 37 # 28 Dec 2016\n\nfooter";
        assert_eq!(extract_announcement(record), Ok("100 37 # 1 Jan 2017"));
    }

    #[test]
    fn test_remove_drops_last_line_by_index() {
        let record = "header\n\n100 37 # 1 Jan 2017\n\n200 37 # 28 Dec 2016\n\nfooter";
        let stripped = remove_last_announcement_line(record);

        assert_eq!(stripped, "header\n\n100 37 # 1 Jan 2017\n\n\nfooter");
        assert!(stripped.contains("100 37 # 1 Jan 2017"));
        assert!(!stripped.contains("200 37"));
    }

    #[test]
    fn test_remove_without_announcements_is_identity() {
        for record in ["", "\n", "# comment\n\n#@ 3881174400\n", "abc 12 # 1 Jan 2017"] {
            assert_eq!(remove_last_announcement_line(record), record);
        }
    }

    #[test]
    fn test_remove_decrements_count() {
        let before = count_announcement_lines(SAMPLE);
        let stripped = remove_last_announcement_line(SAMPLE);

        assert_eq!(before, 3);
        assert_eq!(count_announcement_lines(&stripped), 2);
        assert!(!stripped.contains("3692217600"));
        assert!(stripped.contains("2287785600 11 # 1 Jul 1972"));
    }

    #[test]
    fn test_remove_repeatedly_until_empty() {
        let mut record = SAMPLE.to_string();
        for _ in 0..count_announcement_lines(SAMPLE) {
            record = remove_last_announcement_line(&record);
        }

        assert_eq!(count_announcement_lines(&record), 0);
        assert_eq!(remove_last_announcement_line(&record), record);
        assert!(record.starts_with("#\tUpdated through IERS Bulletin C 62\n"));
        assert!(record.ends_with("#h\t16edd3d2 ad1d53d0 3f5f2d3c 7a1e1f7e 4a2c1f4d\n"));
    }

    #[test]
    fn test_remove_keeps_leading_whitespace_lines_and_crlf() {
        let record = "a\r\n  100 37 # 1 Jan 2017\r\n\tb\r\n";
        assert_eq!(remove_last_announcement_line(record), "a\r\n\tb\r\n");
    }

    #[test]
    fn test_remove_prefix_only_match() {
        // the date comment is not required for removal
        let record = "1 2 #\nkeep";
        assert_eq!(remove_last_announcement_line(record), "keep");
    }

    #[test]
    fn test_parse_announcement() {
        let parsed: Announcement = "3692217600 37 # 28 Dec 2016".parse().unwrap();

        assert_eq!(parsed.ntp_seconds, 3_692_217_600);
        assert_eq!(parsed.tai_offset, 37);
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2016, 12, 28).unwrap());
        assert_eq!(parsed.to_string(), "3692217600 37 # 28 Dec 2016");
        assert_eq!(
            parsed.effective_at().map(|at| at.timestamp()),
            Some(1_483_228_800)
        );
    }

    #[test]
    fn test_parse_unpadded_day() {
        let parsed: Announcement = "  2272060800 10 # 1 Jan 1972 ".parse().unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(1972, 1, 1).unwrap());
        assert_eq!(parsed.to_string(), "2272060800 10 # 1 Jan 1972");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for line in ["", "# comment", "100 37 #", "100 37 # 32 Foo 2017"] {
            assert_eq!(
                line.parse::<Announcement>(),
                Err(LeapError::InvalidAnnouncement(line.to_string()))
            );
        }
    }
}
