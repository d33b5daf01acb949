//! kayvee - An In-Process Key-Value Store with TTL
//!
//! This is the main entry point for the kayvee REPL.
//! It opens the store, reads commands from stdin line by line, and prints
//! replies to stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use kayvee::commands::{Command, CommandHandler, Reply};
use kayvee::persistence::FilePersister;
use kayvee::storage::{Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line configuration
#[derive(Debug, Parser)]
#[command(
    name = "kayvee",
    version,
    about = "An in-process key-value store with TTL expiry",
    after_help = "COMMANDS (one per line on stdin):\n    \
                  SET key value [ttlSec]\n    \
                  GET key\n    \
                  DEL key\n    \
                  OUT\n    \
                  STOP"
)]
struct Config {
    /// Snapshot file to load at startup and rewrite after every change
    #[arg(long, env = "KAYVEE_DATA_FILE", default_value = kayvee::DEFAULT_DATA_FILE)]
    data_file: PathBuf,

    /// Keep everything in memory; no snapshot is read or written
    #[arg(long)]
    in_memory: bool,

    /// Milliseconds between background expiry sweeps
    #[arg(long, env = "KAYVEE_EVICTION_INTERVAL_MS", default_value_t = 1000)]
    eviction_interval_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Config {
    fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::default()
            .with_eviction_interval(Duration::from_millis(self.eviction_interval_ms));

        if self.in_memory {
            info!(version = kayvee::VERSION, "kayvee starting (in-memory)");
            return config;
        }

        let persister = FilePersister::new(&self.data_file);
        info!(
            version = kayvee::VERSION,
            data_file = %persister.path().display(),
            "kayvee starting"
        );
        config.with_persister(Arc::new(persister))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Set up logging on stderr, stdout is for replies
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let store = Arc::new(Store::open(config.store_config()).context("failed to open store")?);

    let handler = CommandHandler::new(Arc::clone(&store));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let interrupt = signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !run_line(&handler, &line) {
                        break;
                    }
                }
                Ok(None) => {
                    info!("End of input, stopping");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            },
            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutdown signal received, stopping...");
                break;
            }
        }
    }

    store.shutdown().await.context("final persist failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Runs one input line. Returns false once the REPL should stop.
fn run_line(handler: &CommandHandler, line: &str) -> bool {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    // SET and DEL write the snapshot synchronously
    match tokio::task::block_in_place(|| handler.execute(command)) {
        Ok(Reply::Stop) => {
            println!("{}", Reply::Stop);
            false
        }
        Ok(Reply::Entries(entries)) => {
            for entry in entries {
                println!("{}", entry);
            }
            true
        }
        Ok(reply) => {
            println!("{}", reply);
            true
        }
        Err(e) => {
            warn!(error = %e, "Command failed");
            println!("error: {}", e);
            true
        }
    }
}
