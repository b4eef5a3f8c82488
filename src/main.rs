use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use portal_assist::{
    Config,
    cli::{Cli, Commands, ConfigCommands, chat},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so streamed answers stay clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let args = chat::ChatArgs::from(&cli);

    // No subcommand = interactive chat
    let Some(command) = cli.command else {
        let config = Config::load()?;
        return chat::interactive(&config, &args).await;
    };

    match command {
        Commands::Chat => {
            let config = Config::load()?;
            chat::interactive(&config, &args).await?;
        }

        Commands::Ask { prompt } => {
            let config = Config::load()?;
            chat::ask(&config, &args, &prompt).await?;
        }

        Commands::Serve { host, port } => {
            let config = Config::load()?;
            let host = host.unwrap_or_else(|| config.api.host.clone());
            let port = port.unwrap_or(config.api.port);
            portal_assist::api::serve(config, &host, port).await?;
        }

        Commands::Tools => {
            let config = Config::load()?;
            chat::list_tools(&config).await?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let mut config = Config::load()?;
                if config.inference.api_key.is_some() {
                    config.inference.api_key = Some("********".to_string());
                }
                if config.api.token.is_some() {
                    config.api.token = Some("********".to_string());
                }
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}
