//! JSON configuration parsing for headless mode
//!
//! Parses JSON match configurations and turns them into the pieces a session is
//! built from: roster, host, arena, match mode and gameplay tuning.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::bot::BotStyle;
use crate::match_state::MatchMode;
use crate::net::ParticipantId;
use crate::sim::config::GameplayConfig;
use crate::sim::terrain::ArenaLayout;

/// Headless match configuration loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessMatchConfig {
    /// Number of bot-driven participants (default: 2)
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Index of the hosting participant (default: 0)
    #[serde(default)]
    pub host: usize,
    /// Arena preset name (default: "Platform")
    #[serde(default = "default_arena")]
    pub arena: String,
    /// Win condition (default: first to 5 kills)
    #[serde(default)]
    pub mode: MatchMode,
    /// Bot style per participant ("Aggressive", "Wanderer" or "Idle"); missing
    /// entries default to Aggressive
    #[serde(default)]
    pub bot_styles: Vec<String>,
    /// Custom output path for match log (optional)
    #[serde(default)]
    pub output_path: Option<String>,
    /// Maximum match duration in seconds (default: 300)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Random seed for deterministic match reproduction
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Gameplay tuning overrides; omitted fields keep their defaults
    #[serde(default)]
    pub gameplay: GameplayConfig,
}

fn default_participants() -> usize {
    2
}

fn default_arena() -> String {
    "Platform".to_string()
}

fn default_max_duration() -> f32 {
    300.0
}

impl Default for HeadlessMatchConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
            host: 0,
            arena: default_arena(),
            mode: MatchMode::default(),
            bot_styles: Vec::new(),
            output_path: None,
            max_duration_secs: default_max_duration(),
            random_seed: None,
            gameplay: GameplayConfig::default(),
        }
    }
}

impl HeadlessMatchConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: HeadlessMatchConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.gameplay.validate()?;

        let limit = self.gameplay.max_participants;
        if self.participants == 0 || self.participants > limit {
            return Err(format!(
                "participants must be 1-{}, got {}",
                limit, self.participants
            ));
        }
        if self.host >= self.participants {
            return Err(format!(
                "host {} is out of range ({} participants)",
                self.host, self.participants
            ));
        }

        self.load_arena()?;

        if self.bot_styles.len() > self.participants {
            return Err(format!(
                "{} bot styles given for {} participants",
                self.bot_styles.len(),
                self.participants
            ));
        }
        for style in &self.bot_styles {
            BotStyle::parse(style)?;
        }

        match self.mode {
            MatchMode::ScoreBased { target } if target == 0 => {
                return Err("score target must be at least 1".to_string());
            }
            MatchMode::TimeBased { duration } if duration <= 0.0 => {
                return Err("timed match duration must be positive".to_string());
            }
            _ => {}
        }

        if self.max_duration_secs <= 0.0 {
            return Err("max_duration_secs must be positive".to_string());
        }

        Ok(())
    }

    /// Participant ids, assigned in order starting at 0.
    pub fn roster(&self) -> Vec<ParticipantId> {
        (0..self.participants as ParticipantId).collect()
    }

    pub fn host_id(&self) -> ParticipantId {
        self.host as ParticipantId
    }

    /// Build the configured arena preset.
    pub fn load_arena(&self) -> Result<ArenaLayout, String> {
        ArenaLayout::preset(&self.arena, self.gameplay.kill_y_margin).ok_or_else(|| {
            format!(
                "Unknown arena: '{}'. Valid arenas: {}",
                self.arena,
                ArenaLayout::preset_names().join(", ")
            )
        })
    }

    /// Bot style of every participant, defaulting missing entries.
    pub fn bot_styles(&self) -> Vec<BotStyle> {
        let mut styles: Vec<BotStyle> = self
            .bot_styles
            .iter()
            .map(|name| BotStyle::parse(name).unwrap_or_default())
            .collect();
        styles.resize(self.participants, BotStyle::default());
        styles
    }
}
