//! # bearer-grant CLI
//!
//! Command-line front end and HTTP token service for the
//! [`bearer_grant`] JWT-bearer client.
//!
//! ```text
//! bearer-grant token --duration 3600
//! bearer-grant assertion --format json
//! bearer-grant serve --bind 127.0.0.1:9000
//! ```

use std::io::IsTerminal;
use std::sync::Arc;

use bearer_grant::{ConfigError, GrantConfig, TokenIssuer};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod error;
pub mod output;
pub mod service;

pub use cli::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};
pub use output::Formatter;
pub use service::TokenService;

/// Parse arguments, run the command and report any error.
///
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    cli.init_tracing();

    let formatter = cli.formatter();
    match cli.execute().await {
        Ok(()) => 0,
        Err(e) => {
            formatter.display_error(&e);
            1
        }
    }
}

impl Cli {
    /// Execute the selected command
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] when configuration, key loading, signing or the
    /// exchange fails.
    pub async fn execute(self) -> CliResult<()> {
        let config = GrantConfig::load(self.config.as_deref())?;
        let formatter = self.formatter();

        match self.command {
            Commands::Token(args) => {
                let issuer = TokenIssuer::from_config(&config)?;
                let token = match args.duration {
                    Some(seconds) => issuer.issue_with_duration(seconds).await?,
                    None => issuer.issue().await?,
                };
                formatter.display_token(&token)
            }
            Commands::Assertion => {
                let issuer = TokenIssuer::from_config(&config)?;
                formatter.display_assertion(&issuer.assertion()?)
            }
            Commands::Serve(args) => {
                let api_key = config
                    .server
                    .api_key
                    .clone()
                    .ok_or(ConfigError::Missing("server.api_key"))?;
                let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

                let issuer = Arc::new(TokenIssuer::from_config(&config)?);
                TokenService::new(issuer, &api_key).serve(&bind).await
            }
        }
    }

    /// Formatter for this invocation; colour only when stdout is a terminal
    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.format, std::io::stdout().is_terminal())
    }

    /// Install the stderr log subscriber.
    ///
    /// `RUST_LOG` wins when set; otherwise the level follows `-q`/`-v`.
    pub fn init_tracing(&self) {
        let level = if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

        // A global subscriber may already be set when embedded
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init();
    }
}
