use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use alarm_enricher::extraction::FindingExtractor;
use alarm_enricher::{AlertPipeline, CloudWatchLogsService, Config, Services, StdoutNotifier};

/// Alarm enricher command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "enricher", about = "Alarm enrichment notifier CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "enricher.toml")]
        output: PathBuf,
    },
    /// Run the pipeline once against a notification payload file
    Invoke {
        /// JSON notification payload
        #[structopt(short, long)]
        payload: PathBuf,
        /// Configuration file (defaults plus environment if omitted)
        #[structopt(short, long)]
        config: Option<PathBuf>,
        /// Print the message instead of sending it
        #[structopt(long)]
        dry_run: bool,
    },
    /// Extract user and source IP from auth log lines
    Extract {
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
        /// Number of lines to show
        #[structopt(short, long, default_value = "10")]
        lines: usize,
        /// Only lines containing this text are considered
        #[structopt(long, default_value = "Failed password")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    match Cli::from_args() {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Invoke { payload, config, dry_run } => {
            let mut cfg = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            cfg.apply_env(|key| std::env::var(key).ok());
            if dry_run {
                cfg.validate_policy()?;
            } else {
                cfg.validate()?;
            }

            let payload: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&payload)?)?;

            let log_service = Arc::new(CloudWatchLogsService::from_env().await);
            let mut services = Services::from_config(&cfg, log_service)?;
            if dry_run {
                services.notifier = Arc::new(StdoutNotifier);
            }

            let pipeline = AlertPipeline::new(&cfg, services)?;
            let result = pipeline.handle(&payload).await?;
            eprintln!("{}", result);
        }
        Cli::Extract { file, lines, pattern } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let extractor = FindingExtractor::new()?;
            let reader = BufReader::new(std::fs::File::open(&file)?);

            let mut shown = 0;
            for line in reader.lines() {
                let line = line?;
                if !line.contains(&pattern) {
                    continue;
                }
                let parsed = extractor.extract_message(&line);
                shown += 1;
                println!("{}. User: {}, IP: {}", shown, parsed.user, parsed.ip);
                if shown >= lines {
                    break;
                }
            }

            if shown == 0 {
                println!("No lines matching {:?} found in {:?}", pattern, file);
            }
        }
    }

    Ok(())
}
