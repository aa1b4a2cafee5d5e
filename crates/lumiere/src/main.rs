use clap::Parser;
use lumiere::{LumiereConfig, PipelineOptions};

mod cli;

use cli::{CacheCommands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.json_logs);

    let config = LumiereConfig::load_with(cli.config.as_deref())?;

    match cli.command {
        Commands::Segment { script } => {
            cli::segment_script(&config, &script, cli.format).await?;
        }

        Commands::Plan { script } => {
            cli::plan_script(&config, &script, cli.format).await?;
        }

        Commands::Run {
            script,
            simulate,
            balance,
        } => {
            let options = PipelineOptions::default()
                .with_simulate(simulate)
                .with_balance(balance);
            cli::run_script(&config, &script, options, cli.format).await?;
        }

        Commands::Cache(CacheCommands::Purge { fingerprint }) => {
            cli::purge_fingerprint(&config, &fingerprint, cli.format).await?;
        }
    }

    Ok(())
}
