//! UniForge - keyboard macro recorder and replayer
//!
//! Run with `uniforge` or `uniforge daemon` to start the daemon.
//! Other subcommands talk to the running daemon over its HTTP API.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uniforge::client::DaemonClient;
use uniforge::config::{self, Config};
use uniforge::key::KeyId;
use uniforge::pattern::Pattern;
use uniforge::{Cli, Commands, Daemon, PatternsAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("uniforge={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.service.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        command => {
            tokio::task::spawn_blocking(move || run_client(command, &config)).await??;
        }
    }

    Ok(())
}

/// Parse a comma-separated key list from the command line
fn parse_keys(keys: &[String]) -> anyhow::Result<Vec<KeyId>> {
    keys.iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| k.parse::<KeyId>().map_err(anyhow::Error::from))
        .collect()
}

fn format_keys(keys: &[KeyId]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Run a subcommand against the daemon's API
fn run_client(command: Commands, config: &Config) -> anyhow::Result<()> {
    let client = DaemonClient::from_config(config);

    match command {
        Commands::Capture {
            duration,
            save,
            hotkey,
        } => {
            let outcome = client.capture(duration)?;
            if let Some(warning) = &outcome.warning {
                eprintln!("Warning: {}", warning);
            }
            println!(
                "Captured {} key(s) in {:.1}s: {}",
                outcome.events.len(),
                outcome.duration,
                format_keys(&outcome.events)
            );

            if let Some(name) = save {
                let patterns = client.save_pattern(&name, &outcome.events, hotkey.as_deref())?;
                println!("Saved pattern '{}'", name);
                if let Some(hotkey) = hotkey.filter(|h| !h.trim().is_empty()) {
                    report_binding(&patterns, &name, &hotkey);
                }
            }
        }

        Commands::Replay { name, keys } => {
            let status = match (name, keys) {
                (_, Some(keys)) => client.replay_keys(&parse_keys(&keys)?)?,
                (Some(name), None) => client.replay_name(&name)?,
                (None, None) => anyhow::bail!("Give a pattern name or --keys"),
            };
            for failure in &status.failed {
                eprintln!(
                    "Key '{}' at position {} failed: {}",
                    failure.key, failure.index, failure.reason
                );
            }
            println!("Replayed");
        }

        Commands::Patterns { action } => match action.unwrap_or(PatternsAction::List) {
            PatternsAction::List => {
                let patterns = client.patterns()?;
                if patterns.is_empty() {
                    println!("No patterns stored");
                }
                for pattern in patterns {
                    match pattern.hotkey {
                        Some(hotkey) => println!(
                            "{}  [{}]  {}",
                            pattern.name,
                            hotkey,
                            format_keys(&pattern.events)
                        ),
                        None => println!("{}  {}", pattern.name, format_keys(&pattern.events)),
                    }
                }
            }
            PatternsAction::Add { name, keys, hotkey } => {
                let events = parse_keys(&keys)?;
                let patterns = client.save_pattern(&name, &events, hotkey.as_deref())?;
                println!("Saved pattern '{}' ({} key(s))", name, events.len());
                if let Some(hotkey) = hotkey.filter(|h| !h.trim().is_empty()) {
                    report_binding(&patterns, &name, &hotkey);
                }
            }
            PatternsAction::Delete { name } => {
                client.delete_pattern(&name)?;
                println!("Deleted pattern '{}'", name);
            }
        },

        Commands::Bind { name, combo } => {
            if client.register_hotkey(&name, &combo)? {
                println!("Bound {} to '{}'", combo, name);
            } else {
                anyhow::bail!(
                    "Could not bind '{}': the combination is invalid or already in use",
                    combo
                );
            }
        }

        Commands::Daemon | Commands::Config => {
            anyhow::bail!("This command does not talk to the daemon")
        }
    }

    Ok(())
}

/// Report whether a saved pattern kept its hotkey
///
/// The daemon only stores hotkeys it could bind, so a missing hotkey on the
/// saved pattern means the combination was rejected.
fn report_binding(patterns: &[Pattern], name: &str, hotkey: &str) {
    let bound = patterns
        .iter()
        .find(|p| p.name == name.trim())
        .and_then(|p| p.hotkey.as_deref());
    match bound {
        Some(bound) => println!("Hotkey: {}", bound),
        None => eprintln!(
            "Warning: hotkey '{}' was not bound (invalid or already in use)",
            hotkey.trim()
        ),
    }
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");
    println!("{}", toml::to_string_pretty(config)?);

    println!("Patterns file: {:?}", config.patterns_path());
    println!("Data file: {:?}", config.document_path());
    if let Some(path) = Config::default_path() {
        println!("Config file: {:?}", path);
    }

    Ok(())
}
