//! spellclash - multiplayer spell-combat arena simulator
//!
//! Runs a local session of bot-driven participants and writes the combat log.

use std::process::ExitCode;

use spellclash::cli::parse_args;
use spellclash::headless::{run_headless_match, HeadlessMatchConfig};

fn main() -> ExitCode {
    let args = parse_args();

    let mut config = match &args.headless {
        Some(path) => match HeadlessMatchConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => HeadlessMatchConfig::default(),
    };

    if let Some(output) = &args.output {
        config.output_path = Some(output.display().to_string());
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration_secs = max_duration;
    }
    if args.seed.is_some() {
        config.random_seed = args.seed;
    }

    match run_headless_match(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Headless match failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
