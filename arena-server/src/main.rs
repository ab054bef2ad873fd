mod codec;
mod config;
mod connection;
mod dispatch;
mod registry;
mod state;
mod tickers;

use crate::state::AppState;
use arena_core::{Board, Clock, EventBus, GameEvent, GameModel, SystemClock};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Authoritative server for the grid arena game.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Board file to load, overriding the configured path.
    #[arg(long)]
    board: Option<PathBuf>,
    /// Server configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
/// Loads configuration and board, wires clock, event bus, model and
/// registry together, then serves WebSocket clients on `/ws` until an
/// interrupt or terminate signal arrives.
async fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("arena-server: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    let board_path = cli.board.unwrap_or_else(|| config.board_path.clone());
    let board = match Board::load(&board_path) {
        Ok(board) => board,
        Err(err) => {
            eprintln!("arena-server: {err}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        path = %board_path.display(),
        width = board.width(),
        height = board.height(),
        spawn_points = board.spawn_points().len(),
        "Board loaded."
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::new(clock.clone()));
    subscribe_log_listeners(&bus);
    let model = GameModel::new(
        Arc::new(board),
        clock.clone(),
        bus.clone(),
        config.game_rules(),
    );
    let state = Arc::new(AppState::new(config, clock, model));

    let (simulation, broadcast) = tickers::spawn_tickers(&state);

    let app = Router::new()
        .route("/ws", get(connection::websocket_handler))
        .with_state(state.clone());

    let address = state.config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("arena-server: failed to bind {address}: {err}");
            std::process::exit(1);
        }
    };
    tracing::info!(address, "Listening for clients.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await;
    if let Err(err) = served {
        tracing::error!(%err, "Server error.");
    }

    // Whatever ended the serve loop, make sure the tickers see the flag
    // before we wait for their final tick.
    state.shutdown.send_replace(true);
    let _ = simulation.await;
    let _ = broadcast.await;
    tracing::info!("Server stopped.");
}

/// Resolves when SIGINT or SIGTERM arrives, then flips the shutdown flag
/// every ticker and connection task listens on.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "Failed to install the interrupt handler.");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "Failed to install the terminate handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received.");
    state.game.lock().await.set_running(false);
    state.shutdown.send_replace(true);
}

/// Attaches the logging listeners to the event bus. Game logic stays free
/// of log statements for the events themselves; this is where emissions
/// become log lines.
fn subscribe_log_listeners(bus: &EventBus) {
    bus.subscribe("playerJoined", |envelope| {
        if let GameEvent::PlayerJoined {
            player_id,
            player_name,
        } = &envelope.event
        {
            tracing::info!(%player_id, %player_name, "Player joined the board.");
        }
    });
    bus.subscribe("playerLeft", |envelope| {
        if let GameEvent::PlayerLeft { player_id } = &envelope.event {
            tracing::info!(%player_id, "Player left.");
        }
    });
    bus.subscribe("spawn", |envelope| {
        if let GameEvent::Spawn {
            player_id,
            position,
            spawn_index,
        } = &envelope.event
        {
            tracing::debug!(%player_id, x = position.x, y = position.y, spawn_index, "Player spawned.");
        }
    });
    bus.subscribe("bump", |envelope| {
        if let GameEvent::Bump {
            player_id,
            attempted,
            collision,
            ..
        } = &envelope.event
        {
            tracing::debug!(%player_id, x = attempted.x, y = attempted.y, %collision, "Move bumped.");
        }
    });
    bus.subscribe("scoreChange", |envelope| {
        if let GameEvent::ScoreChange { player_id, score } = &envelope.event {
            tracing::debug!(%player_id, score, "Score changed.");
        }
    });
    bus.subscribe("gameStateChange", |envelope| {
        if let GameEvent::GameStateChange { running } = &envelope.event {
            tracing::info!(running, "Game state changed.");
        }
    });
}
