use serde::{Deserialize, Serialize};

/// One row returned by the log query service, as ordered `(field, value)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        LogRecord { fields }
    }

    /// Value of the first field with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn message(&self) -> &str {
        self.get("@message").unwrap_or("")
    }

    pub fn timestamp(&self) -> &str {
        self.get("@timestamp").unwrap_or("")
    }
}

/// An enriched failed-authentication finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 1-based position in the query result
    pub index: usize,
    pub user: String,
    pub ip: String,
    pub location: String,
    pub timestamp_local: String,
}

/// Result of a best-effort enrichment step.
///
/// `Degraded` carries the placeholder text to show instead of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Degraded(String),
}

impl<T> Outcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Degraded(placeholder) => Outcome::Degraded(placeholder),
        }
    }
}

impl Outcome<String> {
    /// The value, or the placeholder when degraded
    pub fn into_text(self) -> String {
        match self {
            Outcome::Success(text) | Outcome::Degraded(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> LogRecord {
        LogRecord::new(pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_record_field_lookup() {
        let rec = record(&[("@timestamp", "2024-01-01 03:00:00"), ("@message", "hello"), ("@ptr", "x")]);
        assert_eq!(rec.message(), "hello");
        assert_eq!(rec.timestamp(), "2024-01-01 03:00:00");
        assert_eq!(rec.get("@ptr"), Some("x"));
        assert_eq!(rec.get("@logStream"), None);
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let rec = record(&[]);
        assert_eq!(rec.message(), "");
        assert_eq!(rec.timestamp(), "");
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(Outcome::Success("Jakarta, ID (Biznet)".to_string()).into_text(), "Jakarta, ID (Biznet)");
        let degraded: Outcome<String> = Outcome::Degraded("Error".into());
        assert!(degraded.is_degraded());
        assert_eq!(degraded.into_text(), "Error");
    }

    #[test]
    fn test_outcome_map_keeps_placeholder() {
        let records: Outcome<Vec<u8>> = Outcome::Degraded("boom".into());
        assert_eq!(records.map(|v| v.len()), Outcome::Degraded("boom".into()));
        assert_eq!(Outcome::Success(vec![1, 2]).map(|v| v.len()), Outcome::Success(2));
    }
}
