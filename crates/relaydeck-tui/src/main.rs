//! `relaydeck`: terminal console for a fleet of smart relays.
//!
//! Devices listed in the config file are loaded in waves, kept fresh by
//! push subscriptions and periodic polling, and shown across three tabs:
//! Devices, Energy, and Events. Relays can be switched after confirmation.
//!
//! Logs are written to a file (default `/tmp/relaydeck.log`) to avoid
//! corrupting the terminal UI.

mod action;
mod app;
mod data_bridge;
mod event;
mod focus;
mod keymap;
mod message;
mod screens;
mod theme;
mod tui;
mod widgets;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use relaydeck_api::{HttpTransport, TransportConfig};
use relaydeck_config::Config;
use relaydeck_core::Controller;

use crate::app::App;

/// Monitor and switch smart relays from the terminal.
#[derive(Parser, Debug)]
#[command(name = "relaydeck", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RELAYDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(long, default_value = "/tmp/relaydeck.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write a starter config file and exit
    #[arg(long)]
    init: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(relaydeck_config::config_path)
    }
}

/// File-only tracing; stdout belongs to the terminal UI. The guard must
/// outlive the app so buffered lines are flushed.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "relaydeck={log_level},relaydeck_core={log_level},relaydeck_api={log_level}"
        ))
    });

    let log_dir = cli
        .log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("relaydeck.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

fn init_config(path: &std::path::Path) -> Result<()> {
    relaydeck_config::save_new_config(&Config::example(), path)
        .wrap_err_with(|| format!("cannot create {}", path.display()))?;
    println!("wrote starter config to {}", path.display());
    Ok(())
}

fn build_controller(config: &Config) -> Result<Controller> {
    let sync = config.sync_config();
    let transport = HttpTransport::new(TransportConfig {
        timeout: sync.fetch_timeout,
        ..TransportConfig::default()
    })
    .wrap_err("cannot build HTTP client")?;

    Ok(Controller::new(config.devices(), Arc::new(transport), sync))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    if cli.init {
        return init_config(&config_path);
    }

    // Hooks before the terminal switches to the alternate screen.
    tui::install_hooks()?;
    let _log_guard = setup_tracing(&cli);

    let config = relaydeck_config::load_config_from(&config_path)
        .wrap_err_with(|| format!("cannot load {}", config_path.display()))?;
    if config.devices.is_empty() {
        bail!(
            "no devices configured in {} (run `relaydeck --init` for a starter file)",
            config_path.display()
        );
    }

    info!(
        config = %config_path.display(),
        devices = config.devices.len(),
        "starting relaydeck"
    );

    let controller = build_controller(&config)?;
    let mut app = App::new(controller);
    app.run().await
}
