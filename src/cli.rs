// Command-line interface definitions for uniforge
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "uniforge")]
#[command(author, version, about = "Record, store and replay keyboard macros")]
#[command(long_about = "
UniForge records short keyboard sequences into named patterns, replays
them on demand and binds them to global hotkeys.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Make /dev/uinput writable (udev rule or input group)
  3. Log out and back in
  4. Run: uniforge (to start the daemon)

USAGE:
  uniforge capture --duration 3 --save copy --hotkey ctrl+alt+1
  uniforge replay copy
  uniforge patterns list
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the API port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Override the directory holding patterns.json and data.json
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Record key presses through the running daemon
    Capture {
        /// Capture window in seconds (1-30)
        #[arg(short, long, value_name = "SECS")]
        duration: Option<f64>,

        /// Save the recording as a pattern with this name
        #[arg(long, value_name = "NAME")]
        save: Option<String>,

        /// Hotkey for the saved pattern (e.g., ctrl+alt+1)
        #[arg(long, value_name = "COMBO", requires = "save")]
        hotkey: Option<String>,
    },

    /// Replay a stored pattern, or an ad-hoc key list
    Replay {
        /// Name of the pattern to replay
        #[arg(required_unless_present = "keys", conflicts_with = "keys")]
        name: Option<String>,

        /// Comma-separated keys to replay instead (e.g., ctrl,c)
        #[arg(long, value_name = "KEYS", value_delimiter = ',')]
        keys: Option<Vec<String>>,
    },

    /// Manage stored patterns
    Patterns {
        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Bind a global hotkey to a stored pattern
    Bind {
        /// Pattern name
        name: String,

        /// Key combination (e.g., ctrl+alt+1)
        combo: String,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List stored patterns (default)
    List,

    /// Store a pattern from a comma-separated key list
    Add {
        /// Pattern name
        name: String,

        /// Comma-separated keys (e.g., ctrl,c)
        #[arg(value_delimiter = ',')]
        keys: Vec<String>,

        /// Hotkey for the pattern (e.g., ctrl+alt+1)
        #[arg(long, value_name = "COMBO")]
        hotkey: Option<String>,
    },

    /// Delete a pattern
    Delete {
        /// Pattern name
        name: String,
    },
}
