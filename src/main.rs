//! stenowire - Client driver for Stenograph stenography writers
//!
//! Tails the writer's realtime file over Wi-Fi and prints each decoded
//! stroke as it is written.

mod config;
mod engine;
mod protocol;
mod transport;

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use engine::{Engine, EngineEvent};
use transport::{find_writer, WifiTransport};

/// stenowire - Stenograph writer driver
#[derive(Parser)]
#[command(name = "stenowire")]
#[command(author = "Stenowire Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Stream strokes from a Stenograph writer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a writer and stream strokes
    Listen {
        /// Writer IP address (skips discovery)
        #[arg(short, long)]
        address: Option<IpAddr>,
    },

    /// Search the network for writers
    Discover {
        /// How long to scan (seconds)
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Listen { address } => {
            run_listen(config, address).await?;
        }
        Commands::Discover { timeout } => {
            run_discovery(config, timeout).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Connect to a writer and print strokes until interrupted
async fn run_listen(config: Config, address: Option<IpAddr>) -> anyhow::Result<()> {
    let mut wifi_config = config.wifi_config()?;
    if address.is_some() {
        wifi_config.address = address;
    }

    let transport = WifiTransport::new(wifi_config);
    let mut engine = Engine::new(config.engine_config());
    let mut event_rx = engine.take_event_receiver().unwrap();

    engine.start(Box::new(transport))?;

    println!("Listening for strokes. Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    EngineEvent::Initializing => {
                        tracing::info!("Connecting to writer...");
                    }
                    EngineEvent::Ready => {
                        println!("Writer connected.");
                    }
                    EngineEvent::Stroke { keys } => {
                        println!("{}", keys.join(" "));
                    }
                    EngineEvent::Disconnected { reason } => {
                        println!("Writer disconnected ({}), reconnecting...", reason);
                    }
                    EngineEvent::Reconnected => {
                        println!("Writer reconnected.");
                    }
                    EngineEvent::Error { message } => {
                        tracing::error!("{}", message);
                        println!("Error: {}", message);
                    }
                    EngineEvent::Stopped => {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                engine.stop().await?;
                break;
            }
        }
    }

    Ok(())
}

/// Broadcast the discovery probe and report what answered
async fn run_discovery(config: Config, timeout_secs: u64) -> anyhow::Result<()> {
    println!("Scanning for writers ({} seconds)...\n", timeout_secs);

    let mut wifi_config = config.wifi_config()?;
    wifi_config.address = None;
    wifi_config.discovery_timeout_ms = timeout_secs * 1000;

    match find_writer(&wifi_config).await {
        Ok(address) => {
            println!("Writer found at {}", address);
        }
        Err(transport::TransportError::DeviceNotFound) => {
            println!("No writers answered.");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Print protocol constants and the key chart
fn print_protocol_info() {
    println!("stenowire Protocol Information");
    println!("==============================\n");

    println!("Header size: {} bytes", protocol::HEADER_SIZE);
    println!("Max read: {:#x} bytes", protocol::MAX_READ);
    println!(
        "Realtime file: {} (disk {})",
        protocol::REALTIME_FILE,
        protocol::DEFAULT_DISK
    );
    println!(
        "Discovery: UDP broadcast port {}, protocol on TCP port {}",
        transport::BROADCAST_PORT,
        transport::WRITER_PORT
    );

    println!("\nKey chart:");
    for row in protocol::STENO_KEY_CHART {
        println!("  {}", row.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        // Test that CLI parsing works
        let cli = Cli::try_parse_from(["stenowire", "info"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_listen_with_address() {
        let cli = Cli::try_parse_from(["stenowire", "listen", "--address", "192.168.1.5"]);
        assert!(cli.is_ok());
    }
}
