//! UniForge: keyboard macro recording, storage and replay
//!
//! This library provides the core functionality for:
//! - Capturing key presses for a bounded window via evdev (Linux) or rdev
//! - Persisting named patterns as a JSON array with atomic file replacement
//! - Replaying patterns through a uinput virtual keyboard with fixed timing
//! - Binding global hotkeys to patterns and replaying them when pressed
//! - Serving all of the above over a small local HTTP API
//!
//! # Architecture
//!
//! ```text
//!                        ┌─────────────────────────────────────┐
//!                        │       HTTP API  /  CLI client       │
//!                        └─────────────────────────────────────┘
//!                                          │
//!           ┌──────────────────────────────┼──────────────────────────┐
//!           │                              │                          │
//!           ▼                              ▼                          ▼
//!  ┌──────────────┐              ┌──────────────┐            ┌──────────────┐
//!  │   Capture    │              │   Pattern    │            │    Hotkey    │
//!  │   Engine     │              │    Store     │            │  Dispatcher  │
//!  └──────────────┘              └──────────────┘            └──────────────┘
//!           │ lease                        │ find                    │ held keys
//!           ▼                              ▼                         │ match
//!  ┌──────────────┐              ┌──────────────┐                    │
//!  │ InputSource  │──────────────│    Replay    │◀───────────────────┘
//!  │ evdev / rdev │  listeners   │    Engine    │   spawn_blocking
//!  └──────────────┘              └──────────────┘
//!                                          │ press / release, 20 ms apart
//!                                          ▼
//!                                 ┌──────────────┐
//!                                 │  KeyEmitter  │
//!                                 │ uinput / rdev│
//!                                 └──────────────┘
//! ```

pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod document;
pub mod error;
pub mod hotkey;
pub mod input;
pub mod key;
pub mod output;
pub mod pattern;
pub mod replay;
pub mod service;

pub use cli::{Cli, Commands, PatternsAction};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, UniforgeError};
