//! echocycle — run the 30-step cyclic scheduler from a terminal
//!
//! Usage:
//!   echocycle --config ./echocycle.toml
//!   echocycle --duration-ms 5000 --json
//!   echocycle --dump-config > echocycle.toml

use clap::Parser;
use echocycle::format::{format_event, format_metrics};
use echocycle_core::SchedulerEvent;
use echocycle_cycle::{CycleConfig, CycleScheduler};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "echocycle", about = "Three-stream, 30-step cognitive cycle scheduler")]
struct Cli {
    /// Path to config file (TOML). Defaults apply when the file is absent.
    #[arg(long, default_value = "./echocycle.toml")]
    config: String,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Stop after this many milliseconds. Default: run until Ctrl-C.
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Print every observation as one JSON line
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", CycleConfig::default().to_toml());
        return Ok(());
    }

    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(expand_tilde(dir), "echocycle.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echocycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    let config = CycleConfig::load(&expand_tilde(&cli.config));
    let scheduler = CycleScheduler::new(config)?;

    let mut rx = scheduler.subscribe();
    let json = cli.json;
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event, json),
                Err(RecvError::Lagged(n)) => tracing::warn!("Output lagged, {} observations dropped", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    scheduler.start().await;

    match cli.duration_ms {
        Some(ms) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    scheduler.stop().await;
    let metrics = scheduler.get_metrics().await;

    // Dropping the scheduler closes the channel; let the printer drain it.
    drop(scheduler);
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string(&metrics)?);
    } else {
        println!("{}", format_metrics(&metrics));
    }
    Ok(())
}

fn print_event(event: &SchedulerEvent, json: bool) {
    if json {
        match event.to_json() {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize {}: {}", event.kind(), e),
        }
    } else if let Some(line) = format_event(event) {
        println!("{}", line);
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
