use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        2.. => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let runtime = tokio::runtime::Runtime::new()?;

    let config_path = cli.config;
    let load_config = || cli::commands::load_config(config_path.as_deref());

    match cli.command {
        Commands::Run(args) => {
            info!("Run command: {:?}", args);
            runtime.block_on(cli::commands::run::execute(args, load_config()?))?;
        }
        Commands::Scan(args) => {
            info!("Scan command: {:?}", args);
            runtime.block_on(cli::commands::scan::execute(args, load_config()?))?;
        }
        Commands::Status(args) => {
            info!("Status command: {:?}", args);
            runtime.block_on(cli::commands::status::execute(args, load_config()?))?;
        }
        Commands::Rebaseline => {
            info!("Rebaselining");
            runtime.block_on(cli::commands::rebaseline::execute(load_config()?))?;
        }
        Commands::Init(args) => {
            info!("Init command: {:?}", args);
            runtime.block_on(cli::commands::init::execute(args, config_path.clone()))?;
        }
    }

    Ok(())
}
