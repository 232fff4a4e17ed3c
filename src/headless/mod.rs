//! Headless mode for automated matches
//!
//! Runs a full local session (every participant in one process, connected by
//! loopback transports and driven by bots) without any graphical output.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless match
//! cargo run --release -- --headless match_config.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "participants": 3,
//!   "arena": "Islands",
//!   "mode": { "ScoreBased": { "target": 3 } },
//!   "bot_styles": ["Aggressive", "Wanderer"],
//!   "max_duration_secs": 120,
//!   "random_seed": 42
//! }
//! ```

pub mod bot;
pub mod config;
pub mod runner;

pub use bot::{BotBrain, BotStyle};
pub use config::HeadlessMatchConfig;
pub use runner::{run_headless_match, MatchEndReason, MatchResult};
