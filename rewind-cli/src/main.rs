//! rewind: inspect and replay recorded sessions from the terminal.
//!
//! # Subcommands
//! - `timeline [--all]`            print the playback schedule and markers
//! - `seek --at <ms> [--raw]`      print the replica document at a time
//! - `play [--speed N] [--from ms]` real-time playback with logged overlay output
//!
//! Every subcommand reads the recording from `--file <path>` or fetches it
//! with `--session <id>` from the session API.

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use rewind_core::config::SourceConfig;
use rewind_core::{RewindConfig, SessionRecording, Timeline};
use rewind_player::{
    load_file, run_playback, EventFilter, HttpSessionSource, LogOverlay, NoopOverlay,
    PlaybackEngine, PlaybackState, SystemClock,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "rewind", version, about = "Inspect and replay recorded sessions")]
struct Cli {
    /// Path to the TOML config (missing file falls back to defaults)
    #[arg(long, default_value = "rewind.toml")]
    config: String,

    /// Session API base URL (overrides `[source].base_url`)
    #[arg(long, env = "REWIND_SERVER")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Stored session JSON on disk
    #[arg(long)]
    file: Option<String>,

    /// Session id to fetch from the session API
    #[arg(long)]
    session: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every scheduled event with raw and compressed times
    Timeline {
        #[command(flatten)]
        source: SourceArgs,

        /// Include mouse moves, mutations and scrolls
        #[arg(long)]
        all: bool,
    },

    /// Render the document as it stood at a point in playback
    Seek {
        #[command(flatten)]
        source: SourceArgs,

        /// Playback time in milliseconds
        #[arg(long)]
        at: u64,

        /// Treat `--at` as uncompressed recording time
        #[arg(long)]
        raw: bool,
    },

    /// Replay in real time, logging cursor, clicks and navigation
    Play {
        #[command(flatten)]
        source: SourceArgs,

        /// Playback rate (overrides `[playback].speed`)
        #[arg(long)]
        speed: Option<f64>,

        /// Start position in milliseconds
        #[arg(long, default_value_t = 0)]
        from: u64,
    },
}

impl Commands {
    fn source(&self) -> &SourceArgs {
        match self {
            Commands::Timeline { source, .. }
            | Commands::Seek { source, .. }
            | Commands::Play { source, .. } => source,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

async fn load_recording(args: &SourceArgs, source: &SourceConfig) -> anyhow::Result<SessionRecording> {
    if let Some(path) = &args.file {
        return load_file(path).with_context(|| format!("failed to read session file {}", path));
    }
    let id = args
        .session
        .as_deref()
        .context("either --file or --session is required")?;
    let client = HttpSessionSource::new(source)?;
    client
        .fetch(id)
        .await
        .with_context(|| format!("failed to fetch session {} from {}", id, source.base_url))
}

// ============================================================================
// Output
// ============================================================================

/// `mm:ss.mmm` for a millisecond offset.
fn format_offset(ms: u64) -> String {
    format!("{:02}:{:02}.{:03}", ms / 60_000, (ms / 1000) % 60, ms % 1000)
}

/// Wall-clock time of an absolute epoch-millisecond timestamp.
fn format_wall(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .filter(|ts| *ts > 0)
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn timeline_lines(timeline: &Timeline, filter: &EventFilter) -> Vec<String> {
    filter
        .apply(timeline)
        .into_iter()
        .map(|i| {
            let te = &timeline.events[i];
            let skipped = if te.skipped > 0 {
                format!("  (skipped {})", format_offset(te.skipped))
            } else {
                String::new()
            };
            format!(
                "{:>5}  {}  raw {}  {}  {}{}",
                i,
                format_offset(te.compressed_relative),
                format_offset(te.raw_relative),
                format_wall(te.event.ts),
                te.event.e.name(),
                skipped
            )
        })
        .collect()
}

fn do_timeline(recording: SessionRecording, config: &RewindConfig, all: bool) {
    let engine = PlaybackEngine::new(recording, &config.playback, SystemClock::new(), NoopOverlay);
    let session = engine.session();
    println!("Session:  {}", session.id);
    if let Some(url) = &session.url {
        println!("URL:      {}", url);
    }
    if let Some(started) = &session.started_at {
        println!("Started:  {}", started);
    }
    println!("Duration: {}", format_offset(engine.total_duration()));
    println!();

    let filter = if all { EventFilter::all() } else { EventFilter::default() };
    for line in timeline_lines(engine.timeline(), &filter) {
        println!("{}", line);
    }

    if !engine.markers().is_empty() {
        println!("\nMarkers:");
        for m in engine.markers() {
            println!("  {}  {}", format_offset(m.at), m.label);
        }
    }
}

fn do_seek(recording: SessionRecording, config: &RewindConfig, at: u64, raw: bool) {
    let mut engine = PlaybackEngine::new(recording, &config.playback, SystemClock::new(), NoopOverlay);
    let target = if raw {
        engine.timeline().compressed_at_raw(at)
    } else {
        at
    };
    engine.seek_to(target);
    let replica = engine.replica();
    eprintln!(
        "at {} of {}: {} events applied, url {}",
        format_offset(target.min(engine.total_duration())),
        format_offset(engine.total_duration()),
        engine.applied(),
        if replica.url.is_empty() { "-" } else { replica.url.as_str() }
    );
    println!("{}", replica.html());
}

async fn do_play(
    recording: SessionRecording,
    config: &RewindConfig,
    speed: Option<f64>,
    from: u64,
) -> PlaybackState {
    let mut playback = config.playback.clone();
    if let Some(speed) = speed {
        playback.speed = speed;
    }
    let mut engine = PlaybackEngine::new(recording, &playback, SystemClock::new(), LogOverlay::new());
    if from > 0 {
        engine.seek_to(from);
    }

    let (tx, rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    let state = run_playback(
        &mut engine,
        Duration::from_millis(playback.frame_interval_ms),
        rx,
    )
    .await;
    println!(
        "stopped at {} of {} ({:?})",
        format_offset(engine.elapsed() as u64),
        format_offset(engine.total_duration()),
        state
    );
    state
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match RewindConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let default_level = config
        .service
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut source = config.source.clone();
    if let Some(server) = &cli.server {
        source.base_url = server.trim_end_matches('/').to_string();
    }

    let recording = load_recording(cli.command.source(), &source).await?;

    match cli.command {
        Commands::Timeline { all, .. } => do_timeline(recording, &config, all),
        Commands::Seek { at, raw, .. } => do_seek(recording, &config, at, raw),
        Commands::Play { speed, from, .. } => {
            do_play(recording, &config, speed, from).await;
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
