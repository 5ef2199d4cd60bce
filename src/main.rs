use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpool::{Allocator, Config, DhcpServer, Result};

#[derive(Parser)]
#[command(name = "dhcpool")]
#[command(author, version, about = "A pooled DHCP server for relayed subnets", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "dhcpool.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting DHCP server with config: {:?}", cli.config);

            let allocator = Allocator::from_config(&config);
            let server = DhcpServer::new(config.server_ip, allocator);

            server.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal, stopping server...");
            server.stop().await;

            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
