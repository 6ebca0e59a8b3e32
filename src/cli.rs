//! Command-line interface definition for tokenview
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving the viewer, checking configuration,
//! and probing the OIDC provider.

use clap::{Parser, Subcommand};

/// tokenview - OpenID Connect token viewer
///
/// Log in against an OpenID Connect provider with the authorization code
/// flow and inspect the resulting identity claims and raw tokens.
#[derive(Parser, Debug, Clone)]
#[command(name = "tokenview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TOKENVIEW_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level for tokenview targets (error, warn, info, debug, trace)
    #[arg(long, env = "TOKENVIEW_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "TOKENVIEW_LOG_JSON")]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for tokenview
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the token viewer web server
    Serve {
        /// Override the listen host from config
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port from config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load and validate configuration, then print it with secrets redacted
    CheckConfig,

    /// Fetch the provider discovery document and print its endpoints
    Discover {
        /// Authority to probe instead of the configured one
        #[arg(short, long)]
        authority: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve the log level for tokenview targets
    ///
    /// An explicit `--log-level` wins; otherwise `--verbose` selects
    /// `debug` and the default is `info`.
    pub fn effective_log_level(&self) -> &str {
        match (&self.log_level, self.verbose) {
            (Some(level), _) => level.as_str(),
            (None, true) => "debug",
            (None, false) => "info",
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            log_level: None,
            json_logs: false,
            command: Commands::Serve {
                host: None,
                port: None,
            },
        }
    }
}
