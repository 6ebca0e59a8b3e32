//! tokenview - OpenID Connect token viewer
//!
#![doc = "Main entry point for the tokenview application."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tokenview::cli::{Cli, Commands};
use tokenview::commands;
use tokenview::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(&cli);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting token viewer server");
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::CheckConfig => {
            tracing::debug!("Checking configuration");
            commands::diagnose::check_config(&config)?;
            Ok(())
        }
        Commands::Discover { authority } => {
            if let Some(a) = &authority {
                tracing::debug!("Using authority override: {}", a);
            }
            commands::diagnose::discover(&config, authority).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the CLI picks the level for
/// tokenview targets. Logs go to stderr so command output stays clean.
fn init_tracing(cli: &Cli) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("tokenview={}", cli.effective_log_level()))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
