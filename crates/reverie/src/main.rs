// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reverie - a conversational agent that remembers.
//!
//! Binary entry point: loads and validates configuration, sets up
//! logging, and dispatches to the interactive shell.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod shell;

/// Reverie - a conversational agent that remembers.
#[derive(Parser, Debug)]
#[command(name = "reverie", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive conversation session.
    Shell,
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match reverie_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            reverie_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the config value when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.agent.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Config) => {
            print_config(&config);
        }
        Some(Commands::Shell) | None => {
            if let Err(e) = shell::run_shell(config).await {
                eprintln!("reverie: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Print the merged configuration as TOML with secrets redacted.
fn print_config(config: &reverie_config::model::ReverieConfig) {
    let mut redacted = config.clone();
    if redacted.llm.api_key.is_some() {
        redacted.llm.api_key = Some("<redacted>".to_string());
    }
    match toml::to_string_pretty(&redacted) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => eprintln!("reverie: failed to render config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    // Empty TOML input: host config files and REVERIE_* vars must not
    // leak into the test.
    #[test]
    fn binary_loads_config_defaults() {
        let config = reverie_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.agent.name, "reverie");
    }
}
