//! Alarm enrichment pipeline
//!
//! alarm event -> classify -> (ALARM) log query -> extract -> geolocate ->
//! local time -> compose -> notify.
//!
//! Every enrichment step degrades to placeholder text; only delivery can
//! fail an invocation.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::alerting::{Notifier, NotifyError, TelegramNotifier};
use crate::config::{Config, ConfigError, GeoProvider, NonAlarmFindings};
use crate::extraction::{FindingExtractor, LocalClock};
use crate::geolocation::{GeoError, GeoLocator, IpApiLocator, MaxMindLocator};
use crate::logquery::{LogQueryClient, LogQueryService};
use crate::message::{classify, FindingsSection, MessageComposer};
use crate::models::{AlarmEvent, Finding, LogRecord, Outcome};

/// Value returned to the invocation framework after delivery
pub const SENT: &str = "Sent";

/// Errors that abort an invocation or prevent the pipeline from being built
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Geolocation setup failed: {0}")]
    Geo(#[from] GeoError),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Process-lifetime handles shared by every invocation
#[derive(Clone)]
pub struct Services {
    pub log_service: Arc<dyn LogQueryService>,
    pub geolocator: Arc<dyn GeoLocator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Build the geolocator configured for this deployment
    pub fn geolocator_from_config(config: &Config, client: Client) -> Result<Arc<dyn GeoLocator>, PipelineError> {
        let geo = &config.geolocation;
        let locator: Arc<dyn GeoLocator> = match (geo.provider, &geo.database_path) {
            (GeoProvider::Maxmind, Some(path)) => Arc::new(MaxMindLocator::open(path)?),
            (GeoProvider::Maxmind, None) => {
                return Err(ConfigError::Invalid("geolocation.database_path is required for the maxmind provider".into()).into())
            }
            (GeoProvider::IpApi, _) => Arc::new(IpApiLocator::new(client, geo.endpoint.clone(), geo.timeout())),
        };
        Ok(locator)
    }

    /// Production wiring: shared HTTP client, Telegram delivery
    pub fn from_config(config: &Config, log_service: Arc<dyn LogQueryService>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.telegram.timeout_secs))
            .build()?;

        Ok(Services {
            log_service,
            geolocator: Self::geolocator_from_config(config, client.clone())?,
            notifier: Arc::new(TelegramNotifier::new(client, &config.telegram)),
        })
    }
}

/// The enrichment pipeline for one deployment
pub struct AlertPipeline {
    query_client: LogQueryClient,
    geolocator: Arc<dyn GeoLocator>,
    notifier: Arc<dyn Notifier>,
    extractor: FindingExtractor,
    clock: LocalClock,
    composer: MessageComposer,
    non_alarm_findings: NonAlarmFindings,
}

impl AlertPipeline {
    pub fn new(config: &Config, services: Services) -> Result<Self, PipelineError> {
        config.validate_policy()?;

        let clock = LocalClock::with_offset_hours(config.message.utc_offset_hours).ok_or_else(|| {
            ConfigError::Invalid(format!("bad utc offset {}", config.message.utc_offset_hours))
        })?;

        Ok(AlertPipeline {
            query_client: LogQueryClient::new(services.log_service, config.log_query.clone()),
            geolocator: services.geolocator,
            notifier: services.notifier,
            extractor: FindingExtractor::new()?,
            clock,
            composer: MessageComposer::new(config.message.clone(), config.log_query.result_limit),
            non_alarm_findings: config.message.non_alarm_findings,
        })
    }

    /// Handle one notification payload, returning [`SENT`] once delivered
    pub async fn handle(&self, payload: &Value) -> Result<&'static str, PipelineError> {
        self.handle_at(payload, Utc::now()).await
    }

    pub async fn handle_at(&self, payload: &Value, now: DateTime<Utc>) -> Result<&'static str, PipelineError> {
        let alarm = AlarmEvent::from_notification(payload);
        log::info!(
            "Alarm transition {} -> {} ({})",
            alarm.old_state,
            alarm.new_state,
            alarm.reason
        );

        let message = self.compose(&alarm, now).await;

        if let Err(e) = self.notifier.send(&message).await {
            log::error!("Delivery via {} failed: {}", self.notifier.name(), e);
            return Err(e.into());
        }

        Ok(SENT)
    }

    /// Build the notification text for an alarm without sending it
    pub async fn compose(&self, alarm: &AlarmEvent, now: DateTime<Utc>) -> String {
        let classification = classify(&alarm.new_state);

        let section = if alarm.new_state.is_alarm() {
            self.findings_section(now).await
        } else {
            match self.non_alarm_findings {
                NonAlarmFindings::Placeholder => FindingsSection::Pending,
                NonAlarmFindings::Omit => FindingsSection::Omitted,
                NonAlarmFindings::Query => self.findings_section(now).await,
            }
        };

        self.composer.compose(&classification, &section)
    }

    async fn findings_section(&self, now: DateTime<Utc>) -> FindingsSection {
        match self.query_client.fetch_recent(now).await {
            Outcome::Success(records) if records.is_empty() => FindingsSection::Empty,
            Outcome::Success(records) => FindingsSection::Findings(self.enrich(&records).await),
            Outcome::Degraded(error) => FindingsSection::Failed(error),
        }
    }

    /// Turn query rows into findings, one geolocation lookup at a time
    pub async fn enrich(&self, records: &[LogRecord]) -> Vec<Finding> {
        let mut findings = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            let line = self.extractor.extract(record);
            let location = self.geolocator.locate(&line.ip).await;
            if location.is_degraded() {
                log::warn!("Finding {} ({}) has no location", i + 1, line.ip);
            }

            findings.push(Finding {
                index: i + 1,
                timestamp_local: self.clock.format(&line.timestamp),
                location: location.into_text(),
                user: line.user,
                ip: line.ip,
            });
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::{Location, LOCAL_NETWORK};
    use crate::logquery::{QueryError, QueryRequest, QueryResults, QueryStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::net::IpAddr;
    use std::sync::Mutex;

    struct FakeLogs {
        result: Result<QueryResults, QueryError>,
        starts: Mutex<usize>,
    }

    impl FakeLogs {
        fn complete(rows: Vec<LogRecord>) -> Self {
            FakeLogs {
                result: Ok(QueryResults { status: QueryStatus::Complete, records: rows }),
                starts: Mutex::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            FakeLogs {
                result: Err(QueryError::Service(message.to_string())),
                starts: Mutex::new(0),
            }
        }

        fn start_count(&self) -> usize {
            *self.starts.lock().unwrap()
        }
    }

    #[async_trait]
    impl LogQueryService for FakeLogs {
        async fn start_query(&self, _request: &QueryRequest) -> Result<String, QueryError> {
            *self.starts.lock().unwrap() += 1;
            Ok("q".into())
        }

        async fn get_query_results(&self, _query_id: &str) -> Result<QueryResults, QueryError> {
            self.result.clone()
        }
    }

    struct FixedGeo;

    #[async_trait]
    impl GeoLocator for FixedGeo {
        async fn lookup(&self, ip: IpAddr) -> Result<Location, GeoError> {
            if ip.to_string() == "9.9.9.9" {
                return Err(GeoError::NotFound);
            }
            Ok(Location::from_parts(Some("Jakarta".into()), Some("ID".into()), Some("Biznet".into())))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "down")));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn row(message: &str, timestamp: &str) -> LogRecord {
        LogRecord::new(vec![
            ("@timestamp".into(), timestamp.into()),
            ("@message".into(), message.into()),
        ])
    }

    fn envelope(state: &str) -> Value {
        let body = json!({ "NewStateValue": state, "OldStateValue": "OK", "NewStateReason": "Threshold Crossed" });
        json!({ "Records": [ { "Sns": { "Message": body.to_string() } } ] })
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.log_query.poll_interval_ms = 0;
        config
    }

    fn pipeline(config: &Config, logs: Arc<FakeLogs>, notifier: Arc<RecordingNotifier>) -> AlertPipeline {
        let services = Services {
            log_service: logs,
            geolocator: Arc::new(FixedGeo),
            notifier,
        };
        AlertPipeline::new(config, services).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 3, 5, 0).unwrap()
    }

    #[tokio::test]
    async fn test_alarm_end_to_end() {
        let logs = Arc::new(FakeLogs::complete(vec![row(
            "Failed password for user bob from 1.2.3.4",
            "2024-01-01 03:00:00",
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let p = pipeline(&test_config(), logs.clone(), notifier.clone());

        assert_eq!(p.handle_at(&envelope("ALARM"), now()).await.unwrap(), SENT);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🚨 🔴 **CRITICAL ALERT** 🚨"));
        assert!(sent[0].contains("👤 **bob**"));
        assert!(sent[0].contains("[1.2.3.4](https://whatismyipaddress.com/ip/1.2.3.4) — Jakarta, ID (Biznet)"));
        assert!(sent[0].contains("`10:00:00 WIB`"));
        assert_eq!(logs.start_count(), 1);
    }

    #[tokio::test]
    async fn test_enrich_builds_findings() {
        let logs = Arc::new(FakeLogs::complete(vec![]));
        let p = pipeline(&test_config(), logs, Arc::new(RecordingNotifier::default()));

        let findings = p
            .enrich(&[
                row("Failed password for user bob from 1.2.3.4", "2024-01-01 03:00:00"),
                row("Failed password for root from 10.0.0.7 port 22", "2024-01-01 02:59:58.120"),
                row("Failed password for user eve from 9.9.9.9", "bad"),
            ])
            .await;

        assert_eq!(
            findings[0],
            Finding {
                index: 1,
                user: "bob".into(),
                ip: "1.2.3.4".into(),
                location: "Jakarta, ID (Biznet)".into(),
                timestamp_local: "10:00:00".into(),
            }
        );
        assert_eq!(findings[1].index, 2);
        assert_eq!(findings[1].user, "?");
        assert_eq!(findings[1].location, LOCAL_NETWORK);
        assert_eq!(findings[1].timestamp_local, "09:59:58");
        assert_eq!(findings[2].location, "Unknown");
        assert_eq!(findings[2].timestamp_local, "");
    }

    #[tokio::test]
    async fn test_non_alarm_skips_query() {
        let logs = Arc::new(FakeLogs::complete(vec![row("Failed password for user bob from 1.2.3.4", "")]));
        let notifier = Arc::new(RecordingNotifier::default());
        let p = pipeline(&test_config(), logs.clone(), notifier.clone());

        p.handle_at(&envelope("OK"), now()).await.unwrap();

        assert_eq!(logs.start_count(), 0);
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].starts_with("✅ 🟢 **RECOVERY (SAFE)** ✅"));
        assert!(sent[0].contains("⏳ _Fetching log data..._"));
    }

    #[tokio::test]
    async fn test_non_alarm_omit_and_query_modes() {
        let logs = Arc::new(FakeLogs::complete(vec![row("Failed password for user bob from 1.2.3.4", "")]));

        let mut config = test_config();
        config.message.non_alarm_findings = NonAlarmFindings::Omit;
        let p = pipeline(&config, logs.clone(), Arc::new(RecordingNotifier::default()));
        let text = p.compose(&AlarmEvent::from_notification(&envelope("INSUFFICIENT_DATA")), now()).await;
        assert!(text.starts_with("⚠️ 🟡 **INSUFFICIENT\\_DATA** ⚠️"));
        assert!(!text.contains("Attackers"));
        assert_eq!(logs.start_count(), 0);

        config.message.non_alarm_findings = NonAlarmFindings::Query;
        let p = pipeline(&config, logs.clone(), Arc::new(RecordingNotifier::default()));
        let text = p.compose(&AlarmEvent::from_notification(&envelope("OK")), now()).await;
        assert!(text.contains("👤 **bob**"));
        assert_eq!(logs.start_count(), 1);
    }

    #[tokio::test]
    async fn test_underscore_user_is_escaped_and_delivered() {
        let logs = Arc::new(FakeLogs::complete(vec![row(
            "Failed password for invalid user db_admin from 1.2.3.4 port 22",
            "2024-01-01 03:00:00",
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let p = pipeline(&test_config(), logs, notifier.clone());

        assert_eq!(p.handle_at(&envelope("ALARM"), now()).await.unwrap(), SENT);

        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].contains("1. 👤 **db\\_admin**"));
        // Every underscore outside the footer italics is escaped
        let body = sent[0].split("📜").next().unwrap();
        assert_eq!(body.matches('_').count(), body.matches("\\_").count());
    }

    #[tokio::test]
    async fn test_malformed_payload_sends_alarm_message() {
        let logs = Arc::new(FakeLogs::complete(vec![]));
        let notifier = Arc::new(RecordingNotifier::default());
        let p = pipeline(&test_config(), logs.clone(), notifier.clone());

        assert_eq!(p.handle_at(&json!({"unexpected": true}), now()).await.unwrap(), SENT);

        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].contains("**CRITICAL ALERT**"));
        assert!(sent[0].contains("📭 Log empty"));
        assert_eq!(logs.start_count(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_still_delivers() {
        let logs = Arc::new(FakeLogs::failing("ResourceNotFoundException: log group missing"));
        let notifier = Arc::new(RecordingNotifier::default());
        let p = pipeline(&test_config(), logs, notifier.clone());

        assert_eq!(p.handle_at(&envelope("ALARM"), now()).await.unwrap(), SENT);
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].contains("⚠️ Error fetching logs: Query service error: ResourceNotFoundExcepti"));
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let p = pipeline(&test_config(), Arc::new(FakeLogs::complete(vec![])), notifier);

        let result = p.handle_at(&envelope("ALARM"), now()).await;
        assert!(matches!(result, Err(PipelineError::Notify(_))));
    }

    #[test]
    fn test_maxmind_without_database_rejected() {
        let mut config = test_config();
        config.geolocation.provider = GeoProvider::Maxmind;
        let result = Services::geolocator_from_config(&config, Client::new());
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
