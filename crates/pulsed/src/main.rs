//! Pulse Daemon - windowed health scoring
//!
//! Pulls metric history from Zabbix, scores it per metric, host and system,
//! and writes every stage to InfluxDB.

use anyhow::{Context, Result};
use clap::Parser;
use pulse_common::config::{ScoringConfig, CONFIG_PATH};
use pulsed::controller::{Collaborators, Mode, ModeController};
use pulsed::credentials::{expand_home, latest_token, tunnel_cookie};
use pulsed::influx::{InfluxSink, LineSink};
use pulsed::properties::{Properties, ServiceMode, Settings, PROPERTIES_PATH};
use pulsed::zabbix::{ZabbixClient, DEFAULT_TIMEOUT_SECS};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pulsed")]
#[command(about = "Windowed metric, host and system health scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Scoring configuration (JSON, or TOML with a .toml extension)
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Connection properties file
    #[arg(long, default_value = PROPERTIES_PATH)]
    properties: PathBuf,

    /// Override the mode selected in the scoring configuration
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Print points as line protocol instead of writing them
    #[arg(long)]
    dry_run: bool,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Pulse Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = ScoringConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let props = Properties::load(&cli.properties)?;
    let settings = Settings::from_properties(&props)?;

    let mode = cli.mode.unwrap_or(if config.continuous {
        Mode::Continuous
    } else {
        Mode::Historical
    });

    let dry_run = cli.dry_run;
    let collaborators = tokio::task::spawn_blocking(move || connect(&settings, dry_run))
        .await
        .context("connect task aborted")??;

    let controller = ModeController::new(config.host_groups(), config.durations(), collaborators);
    let result = match mode {
        Mode::Historical => controller.run_historical().await.map(|_| ()),
        Mode::Continuous => controller
            .run_continuous(shutdown_signal(), None)
            .await
            .map(|_| ()),
    };

    // blocking HTTP clients must not be dropped on a runtime thread
    tokio::task::spawn_blocking(move || drop(controller)).await?;
    result?;

    info!("Finished");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[MODE] Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build the metrics source and the sink. Login failure is fatal.
fn connect(settings: &Settings, dry_run: bool) -> Result<Collaborators> {
    let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

    let zabbix_cookie = tunnel_cookie_for(
        settings,
        settings.zabbix.mode,
        settings.zabbix.token_prefix.as_deref(),
        "zabbix.folder.prefix",
    )?;
    let source = ZabbixClient::connect(&settings.zabbix, zabbix_cookie, timeout)
        .context("Zabbix authentication failed")?;

    let sink: Arc<dyn pulse_common::PointSink> = if dry_run {
        info!("[INFLUX] Dry run, printing line protocol to stdout");
        Arc::new(LineSink::stdout())
    } else {
        let influx_cookie = tunnel_cookie_for(
            settings,
            settings.influx.mode,
            settings.influx.token_prefix.as_deref(),
            "influxdb.folder.prefix",
        )?;
        info!("[INFLUX] Writing to {} (bucket {})", settings.influx.url, settings.influx.bucket);
        Arc::new(InfluxSink::new(&settings.influx, influx_cookie, timeout)?)
    };

    Ok(Collaborators {
        source: Arc::new(source),
        sink,
    })
}

fn tunnel_cookie_for(
    settings: &Settings,
    mode: ServiceMode,
    prefix: Option<&str>,
    prefix_key: &str,
) -> Result<Option<String>> {
    if mode == ServiceMode::Local {
        return Ok(None);
    }

    let folder = settings
        .token_folder
        .as_deref()
        .context("cloudflare.token.path is required in cloud mode")?;
    let prefix = prefix.with_context(|| format!("{} is required in cloud mode", prefix_key))?;
    let token = latest_token(&expand_home(folder), prefix)?;
    Ok(Some(tunnel_cookie(&token)))
}
