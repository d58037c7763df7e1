//! CLI argument parsing

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Main CLI application structure
#[derive(Parser, Debug)]
#[command(
    name = "bearer-grant",
    version,
    about = "Obtain OAuth2 access tokens with a signed JWT-bearer assertion",
    long_about = "bearer-grant signs an RS256 assertion with the application's private key and\n\
                  exchanges it at the authorization server's token endpoint.\n\n\
                  Settings come from an optional config file and BEARER_GRANT_* environment\n\
                  variables (environment wins).\n\n\
                  SECURITY WARNINGS:\n\
                  - `token` and `assertion` print live credentials to stdout\n\
                  - Prefer private_key_path over inline keys in shared environments"
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(long, short = 'c', global = true, env = "BEARER_GRANT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an assertion, exchange it, and print the access token
    Token(TokenArgs),

    /// Build and print a signed assertion without contacting the server
    Assertion,

    /// Run the HTTP token service
    Serve(ServeArgs),
}

/// Arguments for `token`
#[derive(Args, Debug, Default)]
pub struct TokenArgs {
    /// Requested token lifetime in seconds (overrides config)
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,
}

/// Arguments for `serve`
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address (overrides config)
    #[arg(long, short = 'b')]
    pub bind: Option<String>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Plain key/value lines
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
}
