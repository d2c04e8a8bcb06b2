//! KeyMacro command-line entry point.
//!
//! Loads the configuration, installs logging, and drives a [`MacroManager`]
//! for one command:
//!
//! ```text
//! keymacro record [--output PATH] [--duration SECS]   record until Ctrl-C
//! keymacro play   [--input PATH] [--loop]              replay once, or until Ctrl-C
//! keymacro inspect [--input PATH]                      summarise a macro file
//! ```
//!
//! # Supervision loop (for beginners)
//!
//! The manager runs its sessions on plain OS threads, so the async side only
//! watches.  [`supervise`] `select!`s over three things at once:
//!
//! - Ctrl-C from `tokio::signal`.
//! - The manager's failure channel.
//! - A 100 ms tick that checks whether the session ended on its own.
//!
//! Whichever fires first decides how the command ends.  Stopping a session
//! joins a thread, so it runs in `spawn_blocking` to keep the runtime free.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keymacro::infrastructure::input_device::default_platform;
use keymacro::infrastructure::storage::config::{load_config, load_config_from, AppConfig, ConfigError};
use keymacro::{MacroFailure, MacroManager, SessionRole};
use keymacro_core::MacroReader;

#[derive(Debug, Parser)]
#[command(name = "keymacro", version, about = "Record and replay raw keyboard and mouse input")]
struct Cli {
    /// Configuration file to use instead of the platform default.
    #[arg(long, global = true, env = "KEYMACRO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record every input device into a macro file.
    Record {
        /// Macro file to write (defaults to `general.macro_path`).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop automatically after this many seconds.
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Replay a macro file through a virtual input device.
    Play {
        /// Macro file to read (defaults to `general.macro_path`).
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Repeat the macro until interrupted.
        #[arg(short = 'l', long = "loop")]
        looping: bool,
    },
    /// Print the record count and total duration of a macro file.
    Inspect {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

/// Why a supervised session ended.
enum Exit {
    Interrupted,
    DurationElapsed,
    Finished,
    Failed(MacroFailure),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    match cli.command {
        Command::Record { output, duration } => {
            let path = output.unwrap_or_else(|| config.general.macro_path.clone());
            record(&config, path, duration.map(Duration::from_secs)).await
        }
        Command::Play { input, looping } => {
            let path = input.unwrap_or_else(|| config.general.macro_path.clone());
            play(&config, path, looping).await
        }
        Command::Inspect { input } => {
            let path = input.unwrap_or_else(|| config.general.macro_path.clone());
            inspect(&path)
        }
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let loaded = match path {
        Some(path) => load_config_from(path),
        None => match load_config() {
            Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
            other => other,
        },
    };
    loaded.context("loading configuration")
}

async fn record(config: &AppConfig, path: PathBuf, duration: Option<Duration>) -> anyhow::Result<()> {
    let platform = default_platform(config.platform_config());
    let (manager, mut failures) = MacroManager::new(platform, config.macro_settings());
    let manager = Arc::new(manager);

    manager.start_recording(&path);
    info!(path = %path.display(), "recording; press Ctrl-C to stop");

    let deadline = duration.map(|d| Instant::now() + d);
    let exit = supervise(&manager, &mut failures, SessionRole::Recording, deadline).await;

    let stopper = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || stopper.stop_recording())
        .await
        .context("stopping recording")?;

    finish(exit, &mut failures, SessionRole::Recording)
}

async fn play(config: &AppConfig, path: PathBuf, looping: bool) -> anyhow::Result<()> {
    let platform = default_platform(config.platform_config());
    let (manager, mut failures) = MacroManager::new(platform, config.macro_settings());
    let manager = Arc::new(manager);

    manager.start_playing(&path, looping);
    info!(path = %path.display(), looping, "playing");

    let exit = supervise(&manager, &mut failures, SessionRole::Playing, None).await;

    let stopper = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || stopper.stop_playing())
        .await
        .context("stopping playback")?;

    finish(exit, &mut failures, SessionRole::Playing)
}

async fn supervise(
    manager: &MacroManager,
    failures: &mut UnboundedReceiver<MacroFailure>,
    role: SessionRole,
    deadline: Option<Instant>,
) -> Exit {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("cannot listen for Ctrl-C: {e}");
                }
                return Exit::Interrupted;
            }
            Some(failure) = failures.recv() => return Exit::Failed(failure),
            _ = tick.tick() => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Exit::DurationElapsed;
                }
                let active = match role {
                    SessionRole::Recording => manager.is_recording(),
                    SessionRole::Playing => manager.is_playing(),
                };
                if !active {
                    return Exit::Finished;
                }
            }
        }
    }
}

fn finish(
    exit: Exit,
    failures: &mut UnboundedReceiver<MacroFailure>,
    role: SessionRole,
) -> anyhow::Result<()> {
    // A worker sends its failure before it exits, so anything it reported
    // while being stopped is already queued.
    let failure = match exit {
        Exit::Failed(failure) => failure,
        other => match failures.try_recv() {
            Ok(failure) => failure,
            Err(_) => {
                match other {
                    Exit::Interrupted => info!("{role} interrupted"),
                    Exit::DurationElapsed => info!("{role} duration elapsed"),
                    Exit::Finished | Exit::Failed(_) => info!("{role} finished"),
                }
                return Ok(());
            }
        },
    };
    Err(failure.into())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = MacroReader::new(BufReader::new(file));

    let mut records = 0u64;
    let mut total_ms = 0u64;
    for record in &mut reader {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        records += 1;
        total_ms = total_ms.saturating_add(record.delay_ms);
    }

    println!("{}", path.display());
    println!("  records:  {records}");
    println!("  duration: {:.3}s", Duration::from_millis(total_ms).as_secs_f64());
    println!("  skipped:  {}", reader.skipped());
    Ok(())
}
