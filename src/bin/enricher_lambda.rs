use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use alarm_enricher::{AlertPipeline, CloudWatchLogsService, Config, Services};

/// Function entry point: one alarm notification per invocation
#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = Config::load()?;

    // Clients live for the whole process and are reused across invocations
    let log_service = Arc::new(CloudWatchLogsService::from_env().await);
    let services = Services::from_config(&config, log_service)?;
    let pipeline = AlertPipeline::new(&config, services)?;

    log::info!("Alarm enricher ready (log group {})", config.log_query.log_group);

    let pipeline = &pipeline;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle(pipeline, event).await
    }))
    .await
}

async fn handle(pipeline: &AlertPipeline, event: LambdaEvent<Value>) -> Result<String, Error> {
    log::info!("Handling invocation {}", event.context.request_id);
    let outcome = pipeline.handle(&event.payload).await?;
    Ok(outcome.to_string())
}
