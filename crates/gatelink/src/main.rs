//! gatelink - real-time gateway client
//!
//! Connects one shard to the gateway and logs everything it receives.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatelink::{GatewayClient, GatewayConfig, GatewayEvent, ShardInfo};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gatelink")]
#[command(about = "Real-time gateway client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and log events until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "gatelink.toml")]
        config: PathBuf,

        /// Credential used to identify
        #[arg(long, env = "GATELINK_TOKEN", hide_env_values = true)]
        token: String,

        /// Shard index, overrides the config file
        #[arg(long, env = "SHARD_ID")]
        shard_id: Option<u32>,

        /// Shard count, overrides the config file
        #[arg(long, env = "SHARD_COUNT")]
        shard_count: Option<u32>,
    },

    /// Validate a config file
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = "gatelink.toml")]
        config: PathBuf,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "gatelink.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("gatelink=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            token,
            shard_id,
            shard_count,
        } => run(config, token, shard_id, shard_count).await?,
        Commands::CheckConfig { config } => check_config(&config)?,
        Commands::InitConfig { output } => init_config(&output)?,
    }

    Ok(())
}

async fn run(
    config_path: PathBuf,
    token: String,
    shard_id: Option<u32>,
    shard_count: Option<u32>,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting gatelink");

    let mut config = GatewayConfig::from_file(&config_path)?;
    if shard_id.is_some() || shard_count.is_some() {
        config.shard = ShardInfo {
            index: shard_id.unwrap_or(config.shard.index),
            count: shard_count.unwrap_or(config.shard.count),
        };
        config.validate()?;
    }
    info!(
        shard = config.shard.index,
        shard_count = config.shard.count,
        version = config.version,
        encoding = %config.encoding,
        "loaded config"
    );

    let client = GatewayClient::new(config)?;
    let (handle, mut events) = client.connect_channel(token)?;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                log_event(&event);
                if terminal {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("interrupted, closing session");
                handle.destroy(true);
                handle.closed().await;
                break;
            }
        }
    }

    Ok(())
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::Raw(frame) => debug!(op = frame.op, seq = ?frame.s, "frame"),
        GatewayEvent::Debug(message) => debug!("{message}"),
        GatewayEvent::Ping(latency) => info!(?latency, "heartbeat acknowledged"),
        GatewayEvent::Dispatch {
            event_type,
            sequence,
            ..
        } => info!(event = %event_type, seq = ?sequence, "dispatch"),
        GatewayEvent::Disconnected { code, reason } => {
            warn!(?code, reason = %reason, "disconnected");
        }
        GatewayEvent::Reconnecting {
            attempt,
            delay,
            resume,
        } => info!(attempt, ?delay, resume, "reconnecting"),
        GatewayEvent::Terminated { reason } => error!(reason = %reason, "session terminated"),
    }
}

fn check_config(path: &PathBuf) -> anyhow::Result<()> {
    let config = GatewayConfig::from_file(path)?;
    println!("Config OK: {}", path.display());
    println!("  API:      {}", config.api_base_url);
    println!("  Version:  {} ({})", config.version, config.encoding);
    println!("  Intents:  {}", config.intents);
    println!("  Shard:    {}/{}", config.shard.index, config.shard.count);
    Ok(())
}

fn init_config(output: &PathBuf) -> anyhow::Result<()> {
    let content = GatewayConfig::default().to_toml()?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Config written to {}", output.display());
    Ok(())
}
