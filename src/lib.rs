pub mod alerting;
pub mod config;
pub mod extraction;
pub mod geolocation;
pub mod logquery;
pub mod message;
pub mod models;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use models::{AlarmEvent, AlarmState, Finding, LogRecord, Outcome};
pub use config::Config;
pub use alerting::{Notifier, StdoutNotifier, TelegramNotifier};
pub use geolocation::{GeoLocator, IpApiLocator, MaxMindLocator};
pub use logquery::{CloudWatchLogsService, LogQueryClient, LogQueryService};
pub use pipeline::{AlertPipeline, PipelineError, Services, SENT};
