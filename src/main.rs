use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pane_watch::{
    AgentMarker, CaptureOptions, CursorState, FileMarkerStore, MarkerSource, MarkerState,
    Multiplexer, RuntimeConfig, RuntimeMessage, SessionSpec, Status, StatusDetector, Supervisor,
    TmuxClient, Visibility,
};

#[derive(Parser)]
#[command(name = "pwatch")]
#[command(about = "pane-watch - capture, poll and classify agent sessions running in tmux")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/pane-watch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch live tmux sessions and log status transitions
    Watch {
        /// Only adopt sessions whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Poll this session on the focused cadence
        #[arg(long)]
        focus: Option<String>,
    },
    /// Capture one session and classify it
    Capture {
        session: String,
        /// Working directory used for the marker lookup
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List live tmux sessions
    Sessions,
    /// Write an agent status marker (for agent hooks)
    Marker {
        dir: PathBuf,
        state: MarkerArg,
        #[arg(long)]
        detail: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MarkerArg {
    Working,
    Waiting,
    Idle,
}

impl From<MarkerArg> for MarkerState {
    fn from(arg: MarkerArg) -> Self {
        match arg {
            MarkerArg::Working => MarkerState::Working,
            MarkerArg::Waiting => MarkerState::Waiting,
            MarkerArg::Idle => MarkerState::Idle,
        }
    }
}

#[derive(Serialize)]
struct CaptureReport {
    session: String,
    status: Status,
    cursor: CursorState,
    bytes: usize,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pane_watch=info,pwatch=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load_from(path)?,
        None => RuntimeConfig::load()?,
    };

    match cli.command {
        Commands::Watch { prefix, focus } => run_watch(config, prefix, focus).await?,
        Commands::Capture { session, dir, json } => run_capture(&config, &session, dir, json).await?,
        Commands::Sessions => {
            let tmux = TmuxClient::new(&config);
            let sessions = tmux.list_sessions().await?;
            println!("{} live sessions:\n", sessions.len());
            for name in sessions {
                println!("  {}", name);
            }
        }
        Commands::Marker { dir, state, detail } => {
            let store = FileMarkerStore::from_config(&config.status);
            let marker = AgentMarker {
                state: state.into(),
                detail,
                updated_at: Utc::now(),
            };
            let path = store.write(&dir, &marker)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

async fn run_capture(
    config: &RuntimeConfig,
    session: &str,
    dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let tmux = TmuxClient::new(config);
    let options = CaptureOptions {
        history_lines: config.capture.history_lines,
        join_wrapped: config.capture.join_wrapped,
        escape_sequences: false,
    };
    let capture = tmux
        .capture_with_cursor(session, options)
        .await
        .with_context(|| format!("Failed to capture {}", session))?;

    let markers: Arc<dyn MarkerSource> = Arc::new(FileMarkerStore::from_config(&config.status));
    let detector = StatusDetector::new(&config.status, markers);
    let status = detector.evaluate(&capture.text, true, &Status::Active, dir.as_deref());

    if json {
        let report = CaptureReport {
            session: session.to_string(),
            status,
            cursor: capture.cursor,
            bytes: capture.text.len(),
            text: capture.text,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", capture.text);
        println!("---");
        println!("{} {} ({} bytes)", status.icon(), status, capture.text.len());
    }
    Ok(())
}

async fn run_watch(config: RuntimeConfig, prefix: Option<String>, focus: Option<String>) -> Result<()> {
    let prefix = prefix.or_else(|| config.tmux.session_prefix.clone());
    let mux: Arc<dyn Multiplexer> = Arc::new(TmuxClient::new(&config));
    let markers: Arc<dyn MarkerSource> = Arc::new(FileMarkerStore::from_config(&config.status));
    let (mut supervisor, mut rx) = Supervisor::new(config, mux, markers);

    let adopted = supervisor.adopt_live_sessions(prefix.as_deref()).await?;
    for name in &adopted {
        supervisor.set_visibility(name, Visibility::Visible);
    }
    if let Some(focus) = &focus {
        supervisor.set_visibility(focus, Visibility::Focused);
    }
    info!(sessions = adopted.len(), "Watching");

    let _sweeper = supervisor.spawn_sweeper();
    let mut validate = tokio::time::interval(Duration::from_secs(30));
    validate.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut shown: HashMap<String, Status> = HashMap::new();
    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                if let Some(event) = supervisor.handle(message) {
                    report(&event, &mut shown);
                }
            }
            _ = validate.tick() => {
                match supervisor.validate().await {
                    Ok(report) => {
                        for name in report.untracked {
                            if prefix.as_deref().map_or(true, |p| name.starts_with(p)) {
                                supervisor.track(SessionSpec::new(name.clone()));
                                supervisor.set_visibility(&name, Visibility::Visible);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Validation failed"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn report(event: &RuntimeMessage, shown: &mut HashMap<String, Status>) {
    match event {
        RuntimeMessage::OutputChanged {
            session, status, ..
        }
        | RuntimeMessage::OutputUnchanged {
            session, status, ..
        } => {
            if shown.get(session) != Some(status) {
                println!("{} {:<24} {}", status.icon(), session, status);
                shown.insert(session.clone(), status.clone());
            }
        }
        RuntimeMessage::SessionStopped { session, .. } | RuntimeMessage::SessionDead { session, .. } => {
            println!("⏹ {:<24} stopped", session);
            shown.remove(session);
        }
        _ => {}
    }
}
