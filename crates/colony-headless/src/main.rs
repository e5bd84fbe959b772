//! HTTP front door and CLI launcher for the simulator (§6, §9 "Global
//! mutable simulator"). A single `Simulator`/`SessionManager` pair lives
//! behind `AppState`; this binary only wires config loading, logging, and
//! the axum router around it.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use clap::Parser;
use colony_core::Config;
use colony_io::{LeaderboardStore, TelemetrySink};
use colony_sim::Simulator;

use state::AppState;

/// Data-centre simulator and evaluation-harness server.
#[derive(Parser, Debug)]
#[command(name = "colony-headless", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Host/interface to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Serve only the HTTP API (the default; no bundled dashboard ships
    /// with this crate regardless of this flag).
    #[arg(long)]
    api_only: bool,

    /// Accepted for launcher-flag compatibility; this crate does not bundle
    /// an interactive dashboard (out of scope per spec §1), so this starts
    /// the API server the same as the default and logs a notice.
    #[arg(long)]
    dashboard_only: bool,

    /// TOML config file. Created with defaults if it doesn't exist.
    #[arg(long)]
    config: Option<String>,

    /// Path to the CSV leaderboard file.
    #[arg(long)]
    leaderboard_path: Option<String>,

    /// Path to a JSONL file to append one telemetry record per tick.
    #[arg(long)]
    telemetry_log: Option<String>,

    /// Raise the tracing filter level (stackable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "colony_headless=info,colony_sim=info,colony_core=info,colony_io=info",
        1 => "colony_headless=debug,colony_sim=debug,colony_core=debug,colony_io=debug",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.dashboard_only {
        tracing::warn!("--dashboard-only requested but this build ships no dashboard UI; serving the API instead");
    }

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::error!(error = %err, path, "failed to load config, using defaults");
                Config::default()
            }
        },
        None => Config::default(),
    };

    let mut sim = Simulator::new(config);
    if let Some(telemetry_log) = &cli.telemetry_log {
        sim.set_telemetry_sink(Some(TelemetrySink::new(telemetry_log)));
    }

    let leaderboard_path =
        cli.leaderboard_path.clone().unwrap_or_else(|| colony_io::leaderboard::default_leaderboard_path().to_string_lossy().into_owned());
    let leaderboard = LeaderboardStore::new(leaderboard_path);

    let state = AppState::new(sim, leaderboard);
    let app = routes::router(state);

    let addr: SocketAddr = match format!("{}:{}", cli.host, cli.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, host = %cli.host, port = cli.port, "invalid host/port");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, api_only = cli.api_only, "colony-headless listening");
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}
