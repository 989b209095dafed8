//! Mirra: a line-oriented browser over a mirrored media directory.
//!
//! This binary opens the engine on a root directory, populates the rest of
//! the tree in the background, refreshes the current directory when the
//! disk changes under it and executes commands read from stdin.

mod background;
mod commands;
mod watcher;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mirra_core::{Config, Engine, Event, LocalStorage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::background::{spawn_background_scan, ScanMessage, ScanStatus};
use crate::commands::{describe_event, Command, Session};
use crate::watcher::{DirWatcher, WatchMessage};

#[derive(Parser, Debug)]
#[command(name = "mirra", version, about = "Browse a media directory through a live mirror")]
struct Args {
    /// Directory to open (defaults to the current directory)
    root: Option<PathBuf>,
    /// Configuration file (defaults to ~/.config/mirra/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log file, overriding the configured one
    #[arg(long)]
    log: Option<PathBuf>,
    /// Do not watch the current directory for external changes
    #[arg(long)]
    no_watch: bool,
    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(log) = &args.log {
        config.log.file = log.display().to_string();
    }
    if args.no_watch {
        config.watch.enabled = false;
    }
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config, args.verbose)?;

    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().context("reading the current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("opening {}", root.display()))?;

    if let Err(e) = run(&root, config).await {
        tracing::error!("exiting: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to a file so they never interleave with the prompt.
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log.file)
        .with_context(|| format!("opening log file {}", config.log.file))?;
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::from_str(&config.log.level).unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .init();
    Ok(())
}

async fn run(root: &Path, config: Config) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let (scan_tx, mut scan_rx) = mpsc::unbounded_channel::<ScanMessage>();
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<WatchMessage>();

    let debounce = Duration::from_millis(config.watch.debounce_ms);
    let watch_enabled = config.watch.enabled;
    let engine = Engine::open(root, Arc::new(LocalStorage::new()), config, event_tx)?;
    let mut session = Session::new(engine.root());
    println!(
        "mirra: {} ({} directories queued) - type `help`",
        root.display(),
        engine.scheduler().pending()
    );

    let engine = Arc::new(Mutex::new(engine));
    let wake = Arc::new(Notify::new());
    let background = spawn_background_scan(engine.clone(), wake.clone(), scan_tx);
    let mut status = ScanStatus::Scanning;

    let mut watcher = if watch_enabled {
        match DirWatcher::new(watch_tx, debounce) {
            Ok(mut w) => {
                if let Err(e) = w.watch(root) {
                    tracing::warn!("cannot watch {}: {e}", root.display());
                }
                Some(w)
            }
            Err(e) => {
                tracing::warn!("file watcher unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                let show_status = command == Command::Status;
                let result = {
                    let mut engine = engine.lock().await;
                    session.execute(&mut engine, command)
                };
                match result {
                    Ok(reply) => {
                        for line in &reply.lines {
                            println!("{line}");
                        }
                        if show_status {
                            println!("scan      {}", status.label());
                        }
                        if let (Some(dir), Some(w)) = (&reply.watch, watcher.as_mut()) {
                            if let Err(e) = w.watch(dir) {
                                tracing::warn!("cannot watch {}: {e}", dir.display());
                            }
                        }
                        if reply.quit {
                            break;
                        }
                    }
                    Err(e) => println!("error: {e:#}"),
                }
                status = ScanStatus::Scanning;
                wake.notify_one();
            }
            Some(event) = event_rx.recv() => {
                tracing::debug!("{event:?}");
                if matches!(event, Event::Recovered { .. } | Event::Detached { .. }) {
                    println!("{}", describe_event(&event));
                }
            }
            Some(msg) = scan_rx.recv() => match msg {
                ScanMessage::Idle { scanned, skipped } => {
                    status = ScanStatus::Idle;
                    println!("background scan done ({scanned} directories, {skipped} skipped)");
                }
                ScanMessage::Failed(e) => {
                    println!("background scan stopped: {e}");
                    break;
                }
            },
            Some(msg) = watch_rx.recv() => match msg {
                WatchMessage::Changed => {
                    let current = session.current().to_path_buf();
                    let result = engine.lock().await.refresh(&current);
                    match result {
                        Ok(diff) if !diff.is_empty() => {
                            println!("{} changed on disk", current.display());
                        }
                        Ok(_) => {}
                        Err(e) => println!("error: {e:#}"),
                    }
                    wake.notify_one();
                }
                WatchMessage::Error(e) => tracing::warn!("watcher error: {e}"),
            },
        }
    }

    background.abort();
    let _ = background.await;
    drop(watcher);
    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.into_inner().close(),
        Err(_) => tracing::warn!("engine still shared at exit"),
    }
    Ok(())
}
