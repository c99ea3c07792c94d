//! XStream replay server: entry point.
//!
//! ```text
//! xstream-server                   Replay dumps and stream their regions
//! xstream-server --config <path>   Load a custom config TOML
//! xstream-server --catalog <path>  Override the catalog file
//! xstream-server --dump <dir>      Dump every large replayed buffer and exit
//! xstream-server --gen-config      Write default config to stdout
//! xstream-server --write-default-config
//!                                  Write default config to --config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xstream_server::config::{ConfigSource, ServerConfig};
use xstream_server::service::ReplayService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "xstream-server", about = "XStream replay service: per-display frame feeds from dumped buffers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "xstream-server.toml")]
    config: PathBuf,

    /// Signature catalog (.toml or .json), overriding `[catalog] path`.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Dump every replayed buffer of at least the minimum size into DIR and exit.
    #[arg(long, value_name = "DIR")]
    dump: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the `--config` path and exit.
    #[arg(long)]
    write_default_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --write-default-config: bootstrap a config file and exit.
    if cli.write_default_config {
        ServerConfig::write_default(&cli.config)?;
        println!("default configuration written to {}", cli.config.display());
        return Ok(());
    }

    // Load config; its outcome is logged once tracing is up.
    let (mut config, source) = ServerConfig::load(&cli.config);
    if let Some(catalog) = cli.catalog {
        config.catalog.path = catalog;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    info!("xstream-server v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => info!("config: {}", cli.config.display()),
        ConfigSource::Missing => info!("no config at {}; using defaults", cli.config.display()),
        ConfigSource::Invalid(e) => {
            warn!("invalid config {}: {e}; using defaults", cli.config.display())
        }
    }
    info!("catalog: {}", config.catalog.path.display());
    info!("replaying: {}", config.replay.dump_dir.display());
    info!("capture interval: {}s", config.capture.interval_secs);

    let service = ReplayService::new(config);

    // --dump: one-shot candidate dump.
    if let Some(dir) = cli.dump {
        let written = service.dump(&dir)?;
        info!("{written} buffers dumped to {}", dir.display());
        return Ok(());
    }

    // Ctrl-C handler.
    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
