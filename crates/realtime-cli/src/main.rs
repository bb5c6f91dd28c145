//! Binary entry point for the realtime server: config loading, tracing
//! init, and startup. Grounded on `crates/api/src/bin/acp-server.rs`'s
//! `Cli`/`Commands` shape, narrowed to the two subcommands this
//! subsystem needs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use realtime_authn::{JwtTokenValidator, StaticApiKeyValidator};
use realtime_common::RealtimeConfig;
use realtime_core::Hub;
use realtime_rls::PolicyRlsEngine;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "realtime-server")]
#[command(version = "0.1.0")]
#[command(about = "Realtime subsystem: channels, presence, and change notifications over WebSocket")]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "realtime.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the realtime server.
    Server {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration and exit.
    ValidateConfig,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    realtime_common::tracing_init::init_tracing_with_level(log_level)?;

    let config = RealtimeConfig::load(&cli.config)?;
    info!("configuration loaded from {}", cli.config);

    match cli.command {
        Some(Commands::ValidateConfig) => {
            println!("configuration is valid");
            println!("  api keys configured: {}", config.auth.api_keys.len());
            println!("  heartbeat timeout: {}s", config.heartbeat.timeout_secs);
            Ok(())
        }
        Some(Commands::Server { host, port }) => {
            let mut config = config;
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            run_server(config).await
        }
        None => run_server(config).await,
    }
}

async fn run_server(config: RealtimeConfig) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%addr, "starting realtime server");

    let config = Arc::new(config);
    let rls = Arc::new(PolicyRlsEngine::new());
    let api_keys = Arc::new(StaticApiKeyValidator::new(config.auth.api_keys.clone()));
    let tokens = Arc::new(JwtTokenValidator::new(&config.auth.jwt_secret));
    let hub = Arc::new(Hub::new(rls, config.channel.replay_buffer_capacity, config.heartbeat.authz_timeout()));

    let server = realtime_api::RealtimeServer::new(hub, api_keys, tokens, config);
    server.run(&addr).await
}
