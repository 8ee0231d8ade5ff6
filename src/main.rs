use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaselet::{Config, DhcpServer, DnsmasqSupervisor, Result};

#[derive(Parser)]
#[command(name = "leaselet")]
#[command(author, version, about = "A minimal DHCP server for rapid-deployment access points", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in DHCP server (default).
    Run,
    /// Print the effective configuration and exit.
    ShowConfig,
    /// Write the dnsmasq configuration file and exit.
    GenerateDaemonConfig,
    /// Generate the dnsmasq configuration and supervise a dnsmasq process.
    Daemon,
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
            info!("starting DHCP server with config {:?}", cli.config);
            let server = DhcpServer::new(config)?;

            let handle = server.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received shutdown signal");
                    handle.shutdown();
                }
            });

            server.run().await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::GenerateDaemonConfig => {
            let supervisor = DnsmasqSupervisor::new(Arc::new(config));
            let path = supervisor.generate_config()?;
            println!("wrote {}", path.display());
            Ok(())
        }
        Commands::Daemon => {
            let mut supervisor = DnsmasqSupervisor::new(Arc::new(config));
            supervisor.generate_config()?;
            supervisor.start()?;
            info!("dnsmasq running, press ctrl-c to stop");

            tokio::signal::ctrl_c().await?;
            info!("received shutdown signal, stopping dnsmasq");
            supervisor.stop().await
        }
    }
}
