//! Marketroom game server.
//!
//! Run with:
//! ```not_rust
//! cargo run -p marketroom-server
//! cargo run -p marketroom-server -- --host 0.0.0.0 --port 3000 --reconnect-grace-secs 60
//! ```

use clap::Parser;
use marketroom::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: &[&str] = &[
    "marketroom",
    "marketroom_transport",
    "marketroom_protocol",
    "marketroom_session",
    "marketroom_room",
];

#[derive(Parser, Debug)]
#[command(name = "marketroom-server")]
#[command(about = "Real-time multiplayer investment game server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Money each player starts every game with
    #[arg(long, default_value_t = 100_000)]
    starting_capital: u64,

    /// Growth percent a company gets when it attracts all the money
    #[arg(long, default_value_t = 30.0)]
    max_growth: f64,

    /// Seconds a dropped player keeps their seat (0 = leave immediately)
    #[arg(long, default_value_t = 30)]
    reconnect_grace_secs: u64,

    /// Room used when a client doesn't name one
    #[arg(long, default_value = "lobby")]
    default_room: String,

    /// Default log level; RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Installs the tracing subscriber. `RUST_LOG` wins over `default_level`.
fn setup_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                CRATES
                    .iter()
                    .copied()
                    .chain([env!("CARGO_CRATE_NAME")])
                    .map(|krate| format!("{krate}={default_level}"))
                    .collect::<Vec<_>>()
                    .join(",")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), MarketroomError> {
    let args = Args::parse();
    setup_logger(&args.log_level);

    let game_config = GameConfig {
        starting_capital: args.starting_capital,
        max_growth: args.max_growth,
        default_room_key: args.default_room,
        ..GameConfig::default()
    };
    let session_config = SessionConfig {
        reconnect_grace_secs: args.reconnect_grace_secs,
    };

    let server = MarketroomServer::builder()
        .bind(&format!("{}:{}", args.host, args.port))
        .game_config(game_config)
        .session_config(session_config)
        .build()
        .await?;

    tracing::info!(
        addr = ?server.local_addr().ok(),
        starting_capital = args.starting_capital,
        max_growth = args.max_growth,
        reconnect_grace_secs = args.reconnect_grace_secs,
        "listening"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
