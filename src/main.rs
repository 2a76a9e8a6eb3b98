mod collectors;
mod config;
mod metrics;
mod platform;
mod probe;
mod publish;
mod report;

use clap::Parser;
use config::Config;
use metrics::Metrics;
use probe::ProbeSettings;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hwprobe")]
#[command(version, about = "Collects host health metrics and publishes them over MQTT")]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Comma-separated paths to report disk usage for.
    #[arg(long)]
    disk_paths: Option<String>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long, conflicts_with = "no_embedded_board")]
    embedded_board: bool,
    #[arg(long, conflicts_with = "embedded_board")]
    no_embedded_board: bool,
    /// Print the report instead of publishing it.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return ExitCode::SUCCESS;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(csv) = cli.disk_paths {
        cfg.probe.disk_usage_for_drives = csv;
    }
    if let Some(topic) = cli.topic {
        cfg.probe.topic = topic;
    }
    if cli.embedded_board {
        cfg.probe.embedded_board = Some(true);
    } else if cli.no_embedded_board {
        cfg.probe.embedded_board = Some(false);
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration after command-line overrides");
        return ExitCode::FAILURE;
    }

    let embedded_board = cfg
        .probe
        .embedded_board
        .unwrap_or_else(platform::detect_embedded_board);
    let disk_paths = cfg.probe.disk_paths();
    let settings = ProbeSettings::from(&cfg.probe);
    info!(
        disk_paths = ?disk_paths,
        embedded_board,
        topic = %cfg.probe.topic,
        "starting hwprobe"
    );

    let started = Instant::now();
    let report = probe::aggregate(&disk_paths, embedded_board, &settings).await;
    let took = started.elapsed();

    let payload = match report.to_json() {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "failed to serialize report");
            return ExitCode::FAILURE;
        }
    };
    debug!(payload = %payload, "probe report");
    info!(
        keys = report.present_keys().len(),
        took_ms = took.as_millis() as u64,
        "probe finished"
    );

    let metrics = match Metrics::new() {
        Ok(m) => Some(m),
        Err(err) => {
            warn!(error = %err, "failed to initialise self-metrics");
            None
        }
    };
    if let Some(metrics) = &metrics {
        metrics.update_from_report(&report, disk_paths.len(), took);
    }

    let published = if cli.dry_run {
        println!("{payload}");
        true
    } else {
        let messages = publish::report_messages(&cfg.probe, payload);
        match publish::publish_multiple(&cfg.broker, messages).await {
            Ok(()) => {
                info!(
                    host = %cfg.broker.host,
                    port = cfg.broker.port,
                    topic = %cfg.probe.topic,
                    "report published"
                );
                true
            }
            Err(err) => {
                error!(
                    error = %err,
                    host = %cfg.broker.host,
                    port = cfg.broker.port,
                    "failed to publish report"
                );
                false
            }
        }
    };

    if let (Some(metrics), Some(path)) = (&metrics, &cfg.probe.metrics_textfile) {
        metrics.set_publish_success(published);
        if let Err(err) = metrics.write_textfile(path) {
            warn!(error = %err, path = %path.display(), "failed to write metrics textfile");
        }
    }

    if published {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
