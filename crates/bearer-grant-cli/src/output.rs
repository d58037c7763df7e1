//! Output formatting for CLI results

use bearer_grant::{SignedAssertion, TokenResponse};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

/// Writes results to stdout and errors to stderr
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    #[must_use]
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    /// Print an issued token
    pub fn display_token(&self, token: &TokenResponse) -> CliResult<()> {
        match self.format {
            OutputFormat::Json => self.display_json(token),
            OutputFormat::Human => {
                println!("{}", self.render_token(token));
                Ok(())
            }
        }
    }

    /// Print a signed assertion and its claims
    pub fn display_assertion(&self, assertion: &SignedAssertion) -> CliResult<()> {
        match self.format {
            OutputFormat::Json => self.display_json(&json!({
                "assertion": assertion.as_str(),
                "claims": assertion.claims(),
            })),
            OutputFormat::Human => {
                let claims = assertion.claims();
                self.print_field("iss", &claims.iss);
                self.print_field("aud", &claims.aud);
                self.print_field("jti", &claims.jti);
                self.print_field("iat", &claims.iat.to_string());
                self.print_field("exp", &claims.exp.to_string());
                println!("{}", assertion.as_str());
                Ok(())
            }
        }
    }

    /// Print an error with its suggestions
    pub fn display_error(&self, error: &CliError) {
        if self.colored {
            eprintln!(
                "{} [{}]: {}",
                "Error".bright_red().bold(),
                error.category(),
                error
            );
        } else {
            eprintln!("Error [{}]: {}", error.category(), error);
        }

        let suggestions = error.suggestions();
        if suggestions.is_empty() {
            return;
        }
        if self.colored {
            eprintln!("\n{}", "Suggestions:".bright_yellow().bold());
            for suggestion in suggestions {
                eprintln!("  {} {}", "•".bright_blue(), suggestion);
            }
        } else {
            eprintln!("\nSuggestions:");
            for suggestion in suggestions {
                eprintln!("  • {suggestion}");
            }
        }
    }

    fn render_token(&self, token: &TokenResponse) -> String {
        let mut lines = vec![
            self.field_line("token_type", token.token_type.as_deref().unwrap_or("-")),
            self.field_line("expires_in", &token.expires_in.to_string()),
        ];
        let mut extra: Vec<_> = token.additional.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in extra {
            lines.push(self.field_line(key, &value.to_string()));
        }
        lines.push(token.access_token.clone());
        lines.join("\n")
    }

    fn print_field(&self, key: &str, value: &str) {
        println!("{}", self.field_line(key, value));
    }

    fn field_line(&self, key: &str, value: &str) -> String {
        if self.colored {
            format!("{}: {}", key.bright_cyan(), value)
        } else {
            format!("{key}: {value}")
        }
    }

    fn display_json<T: Serialize + ?Sized>(&self, value: &T) -> CliResult<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
