use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::warn;

use storefront_auth::config::{load_config, print_schema, LoggingConfig, MockBackendConfig};
use storefront_auth::models::LoginCredentials;
use storefront_auth::startup::{connect, run_mock_backend};
use storefront_auth::utils::logger::init_logging;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Storefront session client and mock backend.
#[derive(Parser, Debug)]
#[command(name = "storefront-auth", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the JSON schema of the configuration file.
    Schema,

    /// Serve the in-process mock backend.
    MockBackend {
        /// Overrides `mock_backend.bind_address`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Log in and persist the session in the configured store.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: String,
    },

    /// Show the user of the stored session, refreshing it if needed.
    Whoami,

    /// End the stored session.
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult {
    match cli.command {
        Command::Schema => Ok(print_schema()?),
        Command::MockBackend { bind } => {
            // The mock backend needs no `api` section, so a missing or partial
            // file falls back to defaults.
            let (logging, mock) = match load_config(&cli.config) {
                Ok(config) => (config.logging, config.mock_backend.unwrap_or_default()),
                Err(e) => {
                    eprintln!("Using default mock backend settings: {}", e);
                    (LoggingConfig::default(), MockBackendConfig::default())
                }
            };
            init_logging(&logging)?;
            let mock = MockBackendConfig {
                bind_address: bind.unwrap_or(mock.bind_address),
                ..mock
            };
            run_mock_backend(mock).await
        }
        Command::Login { email, password } => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging)?;
            let session = connect(&config).await?;
            if session.is_authenticated().await {
                warn!("Replacing the stored session");
            }
            match session.login(&LoginCredentials::new(email, password)).await {
                Ok(user) => {
                    println!("Logged in as {} <{}>", user.name, user.email);
                    Ok(())
                }
                Err(e) => Err(e.user_message().into()),
            }
        }
        Command::Whoami => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging)?;
            let session = connect(&config).await?;
            match session.current_user().await {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Command::Logout => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging)?;
            let session = connect(&config).await?;
            session.logout().await;
            println!("Logged out");
            Ok(())
        }
    }
}
