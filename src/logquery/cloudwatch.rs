//! CloudWatch Logs Insights backend

use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::types::ResultField;
use aws_sdk_cloudwatchlogs::Client;

use super::{LogQueryService, QueryError, QueryRequest, QueryResults, QueryStatus};
use crate::models::LogRecord;

/// Log query service backed by CloudWatch Logs Insights
#[derive(Clone)]
pub struct CloudWatchLogsService {
    client: Client,
}

impl CloudWatchLogsService {
    pub fn new(client: Client) -> Self {
        CloudWatchLogsService { client }
    }

    /// Build a client from the ambient AWS configuration (env, profile, role)
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_from_env().await;
        CloudWatchLogsService::new(Client::new(&sdk_config))
    }
}

fn to_record(row: &[ResultField]) -> LogRecord {
    LogRecord::new(
        row.iter()
            .filter_map(|field| {
                let name = field.field()?;
                Some((name.to_string(), field.value().unwrap_or("").to_string()))
            })
            .collect(),
    )
}

#[async_trait]
impl LogQueryService for CloudWatchLogsService {
    async fn start_query(&self, request: &QueryRequest) -> Result<String, QueryError> {
        let output = self
            .client
            .start_query()
            .log_group_name(&request.log_group)
            .start_time(request.start_time)
            .end_time(request.end_time)
            .query_string(&request.query)
            .send()
            .await
            .map_err(|e| QueryError::Service(e.to_string()))?;

        output
            .query_id()
            .map(String::from)
            .ok_or(QueryError::MissingQueryId)
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, QueryError> {
        let output = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| QueryError::Service(e.to_string()))?;

        let status = output
            .status()
            .map(|s| QueryStatus::from_name(s.as_str()))
            .unwrap_or_else(|| QueryStatus::Unknown("missing".to_string()));

        let records = output.results().iter().map(|row| to_record(row)).collect();

        Ok(QueryResults { status, records })
    }
}
