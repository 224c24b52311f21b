//! Display control lock daemon
//!
//! Holds a display control lock on behalf of each given process and keeps
//! offloading blocked until every one of them has exited.
//!
//! Usage: `offload-lockd [--config PATH] PID...`

use anyhow::{Context, Result, bail};
use offload_config::OffloadConfig;
use offload_lock::{LockRegistry, ProcessToken, ProcessWatch};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use tracing::{info, warn};

/// Command line arguments
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    pids: Vec<i32>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                _ => {
                    let pid = arg
                        .parse::<i32>()
                        .with_context(|| format!("Invalid pid: {}", arg))?;
                    if pid <= 0 {
                        bail!("Invalid pid: {} (must be positive)", arg);
                    }
                    parsed.pids.push(pid);
                }
            }
        }

        if parsed.pids.is_empty() {
            bail!("Usage: offload-lockd [--config PATH] PID...");
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    setup_logging();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => OffloadConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => OffloadConfig::load_default().context("Failed to load configuration")?,
    };

    let watch = Arc::new(
        ProcessWatch::new(config.lock.poll_interval())
            .context("Failed to start process watch")?,
    );

    let (done_tx, done_rx) = mpsc::channel();
    let registry: LockRegistry<ProcessToken> = LockRegistry::new(
        watch,
        || info!("Display control blocked"),
        move || {
            info!("Display control released");
            let _ = done_tx.send(());
        },
    );

    let mut held = 0;
    for pid in &args.pids {
        let token = ProcessToken::new(*pid);
        if registry.acquire(token, token.to_string()) {
            held += 1;
        } else {
            warn!("Skipping {}: not running", token);
        }
    }

    if held == 0 {
        bail!("None of the given processes are running");
    }

    info!("Holding display control for {} process(es)", held);
    // A holder may die while later pids are still being acquired
    loop {
        done_rx
            .recv()
            .context("Lock registry dropped before release")?;
        if !registry.should_block() {
            break;
        }
    }

    info!("All holders exited");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
