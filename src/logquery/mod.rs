//! Bounded log queries for recent authentication failures
//!
//! The query service is asynchronous: a query is started, then its status
//! is polled until it completes. Polling is capped so an invocation never
//! waits longer than `poll_attempts * poll_interval`.

pub mod cloudwatch;

pub use cloudwatch::CloudWatchLogsService;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LogQueryConfig;
use crate::models::{LogRecord, Outcome};

/// Errors raised by the log query service
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("Query service error: {0}")]
    Service(String),

    #[error("Query service returned no query id")]
    MissingQueryId,

    #[error("Query ended with status {0}")]
    Terminated(QueryStatus),
}

/// Status of a running query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    Unknown(String),
}

impl QueryStatus {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Scheduled" => QueryStatus::Scheduled,
            "Running" => QueryStatus::Running,
            "Complete" => QueryStatus::Complete,
            "Failed" => QueryStatus::Failed,
            "Cancelled" => QueryStatus::Cancelled,
            "Timeout" => QueryStatus::Timeout,
            other => QueryStatus::Unknown(other.to_string()),
        }
    }

    /// The query finished without producing results
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, QueryStatus::Failed | QueryStatus::Cancelled | QueryStatus::Timeout)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Scheduled => f.write_str("Scheduled"),
            QueryStatus::Running => f.write_str("Running"),
            QueryStatus::Complete => f.write_str("Complete"),
            QueryStatus::Failed => f.write_str("Failed"),
            QueryStatus::Cancelled => f.write_str("Cancelled"),
            QueryStatus::Timeout => f.write_str("Timeout"),
            QueryStatus::Unknown(name) => f.write_str(name),
        }
    }
}

/// A query to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub log_group: String,
    /// Window start, epoch seconds
    pub start_time: i64,
    /// Window end, epoch seconds
    pub end_time: i64,
    pub query: String,
}

/// Snapshot returned by a status poll
#[derive(Debug, Clone)]
pub struct QueryResults {
    pub status: QueryStatus,
    pub records: Vec<LogRecord>,
}

/// External log query service (start, then poll)
#[async_trait]
pub trait LogQueryService: Send + Sync {
    /// Start a query, returning its id
    async fn start_query(&self, request: &QueryRequest) -> Result<String, QueryError>;

    /// Fetch the current status and any results
    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, QueryError>;
}

/// Runs the failed-authentication query with a bounded poll budget
pub struct LogQueryClient {
    service: Arc<dyn LogQueryService>,
    config: LogQueryConfig,
}

impl LogQueryClient {
    pub fn new(service: Arc<dyn LogQueryService>, config: LogQueryConfig) -> Self {
        LogQueryClient { service, config }
    }

    /// Request covering the lookback window ending at `now`
    pub fn request_at(&self, now: DateTime<Utc>) -> QueryRequest {
        // Out-of-range lookbacks clamp to the earliest representable time
        let start = TimeDelta::try_minutes(self.config.lookback_minutes)
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        QueryRequest {
            log_group: self.config.log_group.clone(),
            start_time: start.timestamp(),
            end_time: now.timestamp(),
            query: self.config.query_string(),
        }
    }

    /// Fetch recent failure records.
    ///
    /// An empty list means the query did not complete within the poll
    /// budget or matched nothing. Service errors degrade to their message.
    pub async fn fetch_recent(&self, now: DateTime<Utc>) -> Outcome<Vec<LogRecord>> {
        match self.try_fetch(now).await {
            Ok(records) => Outcome::Success(records),
            Err(e) => {
                log::warn!("Log query failed: {}", e);
                Outcome::Degraded(e.to_string())
            }
        }
    }

    async fn try_fetch(&self, now: DateTime<Utc>) -> Result<Vec<LogRecord>, QueryError> {
        let request = self.request_at(now);
        let query_id = self.service.start_query(&request).await?;
        log::info!("Started log query {} on {}", query_id, request.log_group);

        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval()).await;

            let results = self.service.get_query_results(&query_id).await?;
            log::debug!("Poll {}/{}: {}", attempt, self.config.poll_attempts, results.status);

            if results.status == QueryStatus::Complete {
                let mut records = results.records;
                records.truncate(self.config.result_limit);
                return Ok(records);
            }
            if results.status.is_terminal_failure() {
                return Err(QueryError::Terminated(results.status));
            }
        }

        log::warn!(
            "Log query {} not complete after {} polls, continuing without findings",
            query_id,
            self.config.poll_attempts
        );
        Ok(Vec::new())
    }
}
