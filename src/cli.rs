//! Command-line interface for spellclash
//!
//! Without `--headless` a default two-bot match is run.

use clap::Parser;
use std::path::PathBuf;

/// Multiplayer spell-combat arena simulator
#[derive(Parser, Debug)]
#[command(name = "spellclash")]
#[command(about = "Multiplayer spell-combat arena simulator")]
#[command(version)]
pub struct Args {
    /// Run the match described by the specified JSON config file
    #[arg(long, value_name = "CONFIG_FILE")]
    pub headless: Option<PathBuf>,

    /// Output path for match log
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Maximum match duration in seconds (overrides the config file)
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Random seed for a reproducible match (overrides the config file)
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([
            "spellclash",
            "--headless",
            "match.json",
            "--seed",
            "7",
            "--max-duration",
            "60",
        ]);
        assert_eq!(args.headless, Some(PathBuf::from("match.json")));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.max_duration, Some(60.0));
        assert!(args.output.is_none());
    }
}
