//! Finding extraction from raw authentication log records

pub mod timestamp;

pub use timestamp::LocalClock;

use crate::models::LogRecord;
use regex::Regex;

/// User and source address pulled out of one log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub user: String,
    pub ip: String,
    /// Raw `@timestamp` value, empty if the record had none
    pub timestamp: String,
}

/// Pattern-based extractor for sshd-style failure lines
///
/// Example: "Failed password for invalid user admin from 203.0.113.9 port 22 ssh2"
pub struct FindingExtractor {
    ip_pattern: Regex,
    user_pattern: Regex,
}

impl FindingExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(FindingExtractor {
            ip_pattern: Regex::new(r"from (\d+\.\d+\.\d+\.\d+)")?,
            user_pattern: Regex::new(r"user (\S+)")?,
        })
    }

    /// Extract from a query result record
    pub fn extract(&self, record: &LogRecord) -> ParsedLine {
        let mut line = self.extract_message(record.message());
        line.timestamp = record.timestamp().to_string();
        line
    }

    /// Extract from a bare message, leaving the timestamp empty
    pub fn extract_message(&self, message: &str) -> ParsedLine {
        let ip = self
            .ip_pattern
            .captures(message)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let user = self
            .user_pattern
            .captures(message)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "?".to_string());

        ParsedLine {
            user,
            ip,
            timestamp: String::new(),
        }
    }
}
