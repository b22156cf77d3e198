//! KneeGuard headless runner
//!
//! ```text
//! kneeguard run [--config FILE] [--export-dir DIR]
//! kneeguard analysis-server [--addr ADDR] [--unframed] [--sample-rate HZ]
//! ```
//!
//! `run` binds the telemetry socket, connects to the analysis service and drives the
//! session at the configured tick rate, taking commands from stdin. Log verbosity
//! follows `RUST_LOG` (default `info`).

mod control;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::TryRecvError;
use log::{info, warn};

use kneeguard_connectors::{AnalysisClient, AnalysisWorker, TelemetryChannel, ZmqPullSource};
use kneeguard_core::constants::network::DEFAULT_ANALYSIS_ADDR;
use kneeguard_core::scoring::TickOutcome;
use kneeguard_core::{
    AnalysisConfig, AnalysisMode, DisabledAnalyzer, Framing, LatestReadingCache, MonotonicTime, ReadingSource,
    ScoringPhase, Session, SessionConfig, SmoothnessAnalyzer,
};
use kneeguard_smoothness::AnalysisServer;

use control::{spawn_reader, ControlCommand};

#[derive(Parser, Debug)]
#[command(name = "kneeguard")]
#[command(version, about = "Knee-flexion tracking game driven by two orientation sensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a session, reading commands from stdin
    Run {
        /// JSON session configuration (defaults apply to missing keys)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory used by `export` when no directory is given
        #[arg(long, value_name = "DIR", default_value = ".")]
        export_dir: PathBuf,
    },

    /// Serve the reference smoothness analysis
    AnalysisServer {
        #[arg(long, default_value = DEFAULT_ANALYSIS_ADDR)]
        addr: String,

        /// Bare JSON documents instead of length-prefixed frames
        #[arg(long, default_value_t = false)]
        unframed: bool,

        /// Fixed sampling rate (Hz) instead of deriving it from each window
        #[arg(long, value_name = "HZ")]
        sample_rate: Option<f64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Run { config, export_dir } => run(config, export_dir),
        Command::AnalysisServer { addr, unframed, sample_rate } => {
            let framing = if unframed { Framing::Unframed } else { Framing::LengthPrefixed };
            let server = AnalysisServer::bind(&addr, framing)?.with_sample_rate(sample_rate);
            server.serve()?;
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SessionConfig> {
    let config = match path {
        Some(path) => SessionConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_analyzer(config: &AnalysisConfig) -> Box<dyn SmoothnessAnalyzer> {
    if !config.enabled {
        info!("Smoothness analysis disabled by configuration");
        return Box::new(DisabledAnalyzer);
    }

    let client = AnalysisClient::connect_or_disable(config);
    match config.mode {
        AnalysisMode::Blocking => Box::new(client),
        AnalysisMode::Worker => match AnalysisWorker::spawn(client) {
            Ok(worker) => Box::new(worker),
            Err(err) => {
                warn!("Analysis worker unavailable, analysis disabled: {}", err);
                Box::new(DisabledAnalyzer)
            }
        },
    }
}

fn run(config_path: Option<PathBuf>, export_dir: PathBuf) -> Result<()> {
    let config = load_config(config_path)?;
    let tick = Duration::from_millis(config.tick_interval_ms);

    let source = ZmqPullSource::bind(&config.telemetry.endpoint)
        .with_context(|| format!("binding telemetry endpoint {}", config.telemetry.endpoint))?;
    let mut channel = TelemetryChannel::new(source, &config.telemetry);
    channel.start()?;

    let analyzer = build_analyzer(&config.analysis);
    let cache: Arc<LatestReadingCache> = channel.cache();
    let mut session = Session::new(config, cache, analyzer, Box::new(MonotonicTime::new()))?;

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    spawn_reader(io::BufReader::new(io::stdin()), command_tx).context("starting command reader")?;
    info!("Ready. Commands: calibrate, start, stop, restart, difficulty <0..1>, export [dir], status, quit");

    let mut last_phase = session.phase();
    let mut next_tick = Instant::now();
    'ticks: loop {
        loop {
            let command = match command_rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'ticks,
            };
            match command.apply(&mut session, &export_dir) {
                Ok(true) => {}
                Ok(false) => break 'ticks,
                Err(err) => warn!("{}", err),
            }
        }

        let outcome = session.tick();
        report(&session, &mut last_phase, &outcome);

        next_tick += tick;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Fell behind (analysis exchange, slow host); don't try to catch up
            next_tick = now;
        }
    }

    session.shutdown();
    let telemetry = channel.stats();
    if !channel.stop() {
        warn!("Telemetry receive loop did not exit in time");
    }
    info!(
        "Telemetry: {} messages, {} decode failures, {} receive errors",
        telemetry.messages, telemetry.decode_failures, telemetry.receive_errors
    );
    Ok(())
}

fn report<R: ReadingSource, A: SmoothnessAnalyzer>(
    session: &Session<R, A>,
    last_phase: &mut ScoringPhase,
    outcome: &TickOutcome,
) {
    let phase = session.phase();
    if phase != *last_phase {
        info!("Phase: {} -> {}", last_phase.name(), phase.name());
        if phase == ScoringPhase::Calibrating || *last_phase == ScoringPhase::Calibrating {
            info!("{}", session.snapshot().calibration_status);
        }
        *last_phase = phase;
    }

    for assessment in &outcome.assessments {
        info!(
            "Interval {}: {:.0}% in window, +{} points",
            assessment.index,
            assessment.percentage * 100.0,
            assessment.points
        );
    }
    if outcome.ended {
        let state = session.snapshot().state;
        if let Some(grade) = state.current_grade {
            info!("Game over: {} points, grade {}", state.total_points, grade);
        }
    }
}
