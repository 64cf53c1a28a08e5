// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unichat - one realtime API over bridged chat platforms.
//!
//! This is the binary entry point for the gateway.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use unichat_config::{ConfigError, UnichatConfig};

/// Unichat - one realtime API over bridged chat platforms.
#[derive(Parser, Debug)]
#[command(name = "unichat", version, about, long_about = None)]
struct Cli {
    /// Load this file (plus UNICHAT_* overrides) instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway.
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn load(path: Option<&Path>) -> Result<UnichatConfig, Vec<ConfigError>> {
    match path {
        Some(path) => unichat_config::load_and_validate_path(path),
        None => unichat_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            unichat_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("unichat: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "unichat: config ok (homeserver={}, gateway={}:{})",
                config.matrix.homeserver_url, config.gateway.host, config.gateway.port
            );
        }
        None => {
            println!("unichat: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["unichat", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(cli.config.is_none());

        let cli =
            Cli::try_parse_from(["unichat", "check-config", "--config", "/tmp/u.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/u.toml")));
    }

    #[test]
    fn explicit_config_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unichat.toml");

        std::fs::write(&path, "[gateway]\nport = 4000\n").unwrap();
        assert_eq!(load(Some(&path)).unwrap().gateway.port, 4000);

        std::fs::write(&path, "[matrix]\nhomeserver_url = \"ftp://hs\"\n").unwrap();
        let errors = load(Some(&path)).unwrap_err();
        assert!(!errors.is_empty());
    }
}
