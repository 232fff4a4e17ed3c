//! Headless match execution
//!
//! Runs a complete local match without any graphical output: every participant
//! lives in one [`Session`] resource, bots produce their inputs, and the host's
//! notifications feed the combat log.

use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::combat::events::Notification;
use crate::combat::log::{AvatarMetadata, CombatLog, CombatLogEventType, MatchMetadata};
use crate::error::GameError;
use crate::match_state::{MatchMode, MatchPhase};
use crate::net::AvatarId;
use crate::session::{Participant, Session, SharedContext};
use crate::sim::rng::GameRng;
use crate::spells::catalog::{load_spell_catalog, SpellCatalog, SpellId};

use super::bot::BotBrain;
use super::config::HeadlessMatchConfig;

/// Fixed simulation step of headless runs.
const TICK_SECONDS: f64 = 1.0 / 60.0;

/// How a headless match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEndReason {
    /// The host declared a winner
    Won,
    /// The session went back to the lobby before a winner was seen
    ReturnedToLobby,
    /// `max_duration_secs` ran out
    TimedOut,
}

/// Result of a completed headless match
///
/// This struct provides programmatic access to match results for testing and analysis.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The winning avatar, or None for a draw
    pub winner: Option<AvatarId>,
    pub end_reason: MatchEndReason,
    /// Session time at the end of the match in seconds
    pub match_time: f32,
    /// Avatar statistics in id order
    pub avatars: Vec<AvatarResult>,
    /// Random seed used (if deterministic mode)
    pub random_seed: Option<u64>,
    /// Where the combat log was written, if saving succeeded
    pub log_path: Option<String>,
}

/// Statistics for a single avatar after the match
#[derive(Debug, Clone)]
pub struct AvatarResult {
    pub id: AvatarId,
    pub score: u32,
    pub final_health: i32,
    pub alive: bool,
    pub spell: Option<String>,
    /// Total damage dealt, from the host's combat log
    pub damage_dealt: i32,
    pub killing_blows: usize,
}

/// Resource to track headless match state
#[derive(Resource)]
pub struct HeadlessMatchState {
    /// Maximum match duration before declaring a draw
    pub max_duration: f32,
    /// Elapsed session time
    pub elapsed_time: f32,
    /// Custom output path for match log
    pub output_path: Option<String>,
    pub mode: MatchMode,
    /// Whether the match has completed
    pub match_complete: bool,
    /// Set once the host has been seen in Playing
    pub match_started: bool,
    /// Random seed for deterministic simulation (if provided)
    pub random_seed: Option<u64>,
    /// Match result (populated when match completes)
    pub result: Option<MatchResult>,
}

/// Bot brains, one per participant.
#[derive(Resource)]
pub struct HeadlessBots(pub Vec<BotBrain>);

/// Notifications observed by the host, waiting to be logged.
#[derive(Resource, Clone, Default)]
pub struct NotificationBuffer(Arc<Mutex<Vec<Notification>>>);

impl NotificationBuffer {
    fn push(&self, notification: &Notification) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
    }

    fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Plugin for headless match execution
pub struct HeadlessPlugin {
    pub config: HeadlessMatchConfig,
    pub catalog: Arc<SpellCatalog>,
}

impl Plugin for HeadlessPlugin {
    fn build(&self, app: &mut App) {
        let (session, buffer) = match build_session(&self.config, Arc::clone(&self.catalog)) {
            Ok(built) => built,
            Err(e) => {
                error!("Cannot build headless session: {}", e);
                app.add_systems(Startup, |mut exit: EventWriter<AppExit>| {
                    exit.send(AppExit::error());
                });
                return;
            }
        };

        let bots = self
            .config
            .roster()
            .into_iter()
            .zip(self.config.bot_styles())
            .map(|(id, style)| {
                let rng = match self.config.random_seed {
                    Some(seed) => GameRng::from_seed(seed.wrapping_mul(31).wrapping_add(u64::from(id))),
                    None => GameRng::from_entropy(),
                };
                BotBrain::new(id, style, rng)
            })
            .collect();

        app.insert_resource(session)
            .insert_resource(buffer)
            .insert_resource(HeadlessBots(bots))
            .insert_resource(HeadlessMatchState {
                max_duration: self.config.max_duration_secs,
                elapsed_time: 0.0,
                output_path: self.config.output_path.clone(),
                mode: self.config.mode,
                match_complete: false,
                match_started: false,
                random_seed: self.config.random_seed,
                result: None,
            })
            .init_resource::<CombatLog>();

        app.add_systems(Startup, headless_setup_match)
            .add_systems(
                Update,
                (
                    headless_drive_session,
                    headless_record_notifications,
                    headless_check_match_end,
                )
                    .chain(),
            )
            .add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Build the session described by `config` and hook the host's observers up
/// to a notification buffer.
pub fn build_session(
    config: &HeadlessMatchConfig,
    catalog: Arc<SpellCatalog>,
) -> Result<(Session, NotificationBuffer), String> {
    config.validate()?;
    let arena = config.load_arena()?;
    let arena_name = arena.name.clone();

    let context = SharedContext {
        config: Arc::new(config.gameplay.clone()),
        catalog,
        terrain: Arc::new(arena),
        mode: config.mode,
    };
    let mut session = Session::new(
        config.roster(),
        config.host_id(),
        context,
        arena_name,
        config.random_seed,
    )
    .map_err(|e| e.to_string())?;

    let buffer = NotificationBuffer::default();
    let sink = buffer.clone();
    let host = session.host();
    match session.participant_mut(host) {
        Some(participant) => {
            participant.observers_mut().subscribe(move |n| sink.push(n));
        }
        None => return Err(GameError::UnknownAvatar(host).to_string()),
    }
    Ok((session, buffer))
}

/// Setup system for headless match
fn headless_setup_match(
    mut session: ResMut<Session>,
    mut combat_log: ResMut<CombatLog>,
    headless_state: Res<HeadlessMatchState>,
) {
    combat_log.clear();
    combat_log.log(
        CombatLogEventType::MatchEvent,
        "Session started (headless mode)".to_string(),
    );

    match headless_state.random_seed {
        Some(seed) => info!("Using deterministic RNG with seed: {}", seed),
        None => info!("Using non-deterministic RNG (no seed provided)"),
    }

    session.start();
    info!(
        "Headless match setup complete: {} participants on {}",
        session.roster().len(),
        session.arena_name()
    );
}

/// Let every bot think, then advance the session by one frame.
fn headless_drive_session(
    time: Res<Time>,
    mut session: ResMut<Session>,
    mut bots: ResMut<HeadlessBots>,
    mut headless_state: ResMut<HeadlessMatchState>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 || headless_state.match_complete {
        return;
    }

    let mut inputs = BTreeMap::new();
    for bot in &mut bots.0 {
        if let Some(view) = session.participant(bot.participant) {
            inputs.insert(bot.participant, bot.think(view, dt));
        }
    }
    session.step(dt, &inputs);
    headless_state.elapsed_time += dt;
}

/// Move the host's notifications into the combat log.
fn headless_record_notifications(
    session: Res<Session>,
    buffer: Res<NotificationBuffer>,
    mut combat_log: ResMut<CombatLog>,
) {
    if let Some(host) = session.host_participant() {
        combat_log.match_time = host.now();
    }
    for notification in buffer.drain() {
        combat_log.record(&notification);
    }
}

/// Check if the match has ended (winner declared, lobby reached, or timeout)
fn headless_check_match_end(
    session: Res<Session>,
    combat_log: Res<CombatLog>,
    mut headless_state: ResMut<HeadlessMatchState>,
) {
    if headless_state.match_complete {
        return;
    }
    let Some(host) = session.host_participant() else {
        return;
    };
    let phase = host.match_state().phase();
    if phase == MatchPhase::Playing {
        headless_state.match_started = true;
    }

    let ending = if let Some(winner) = host.match_state().winner() {
        info!("Match ended! Avatar {} wins!", winner);
        Some((Some(winner), MatchEndReason::Won))
    } else if headless_state.match_started && phase == MatchPhase::Initiation {
        info!("Session returned to the lobby without a winner");
        Some((None, MatchEndReason::ReturnedToLobby))
    } else if headless_state.elapsed_time >= headless_state.max_duration {
        info!(
            "Match timed out after {:.1}s - declaring DRAW",
            headless_state.elapsed_time
        );
        Some((None, MatchEndReason::TimedOut))
    } else {
        None
    };

    if let Some((winner, reason)) = ending {
        let log_path = save_headless_match_log(&session, &combat_log, winner, &headless_state);
        let result = build_match_result(&session, &combat_log, winner, reason, log_path, &headless_state);
        headless_state.result = Some(result);
        headless_state.match_complete = true;
    }
}

/// Build the MatchResult from the host's view of the avatars
fn build_match_result(
    session: &Session,
    combat_log: &CombatLog,
    winner: Option<AvatarId>,
    end_reason: MatchEndReason,
    log_path: Option<String>,
    headless_state: &HeadlessMatchState,
) -> MatchResult {
    let avatars = session
        .host_participant()
        .map(|host| {
            host.avatars()
                .values()
                .map(|avatar| AvatarResult {
                    id: avatar.id,
                    score: avatar.score,
                    final_health: avatar.health,
                    alive: avatar.is_alive(),
                    spell: spell_name(host, avatar.spell().map(|s| s.spell)),
                    damage_dealt: combat_log.total_damage_dealt(avatar.id),
                    killing_blows: combat_log.killing_blows(avatar.id),
                })
                .collect()
        })
        .unwrap_or_default();

    MatchResult {
        winner,
        end_reason,
        match_time: session.host_participant().map(|host| host.now()).unwrap_or(0.0),
        avatars,
        random_seed: headless_state.random_seed,
        log_path,
    }
}

fn spell_name(host: &Participant, spell: Option<SpellId>) -> Option<String> {
    spell
        .and_then(|id| host.catalog().get(id))
        .map(|definition| definition.name.clone())
}

/// Save the combat log to a file
fn save_headless_match_log(
    session: &Session,
    combat_log: &CombatLog,
    winner: Option<AvatarId>,
    headless_state: &HeadlessMatchState,
) -> Option<String> {
    let avatars = session
        .host_participant()
        .map(|host| {
            host.avatars()
                .values()
                .map(|avatar| AvatarMetadata {
                    id: avatar.id,
                    max_health: avatar.max_health,
                    final_health: avatar.health,
                    score: avatar.score,
                    spell: spell_name(host, avatar.spell().map(|s| s.spell)),
                    final_position: (avatar.body.position.x, avatar.body.position.y),
                })
                .collect()
        })
        .unwrap_or_default();

    let match_metadata = MatchMetadata {
        arena_name: session.arena_name().to_string(),
        mode: headless_state.mode,
        winner,
        random_seed: headless_state.random_seed,
        avatars,
    };

    match combat_log.save_to_file(&match_metadata, headless_state.output_path.as_deref()) {
        Ok(filename) => {
            info!("Match complete. Log saved to: {}", filename);
            Some(filename)
        }
        Err(e) => {
            error!("Failed to save combat log: {}", e);
            None
        }
    }
}

/// Exit the app when the match is complete
fn headless_exit_on_complete(
    headless_state: Res<HeadlessMatchState>,
    mut session: ResMut<Session>,
    mut exit: EventWriter<AppExit>,
) {
    if headless_state.match_complete {
        session.shutdown();
        exit.send(AppExit::Success);
    }
}

/// Assemble the headless app without running it.
pub fn build_headless_app(config: HeadlessMatchConfig, catalog: Arc<SpellCatalog>, with_logging: bool) -> App {
    let mut app = App::new();
    // Minimal plugins - no window, no rendering
    app.add_plugins(MinimalPlugins);
    if with_logging {
        app.add_plugins(LogPlugin::default());
    }
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
        TICK_SECONDS,
    )))
    .add_plugins(HeadlessPlugin { config, catalog });
    app
}

/// Drive `app` frame by frame until it asks to exit, then hand back the result.
pub fn run_to_completion(mut app: App) -> Result<MatchResult, String> {
    app.finish();
    app.cleanup();
    let exit = loop {
        app.update();
        if let Some(exit) = app.should_exit() {
            break exit;
        }
    };
    if exit.is_error() {
        return Err("headless match aborted".to_string());
    }
    app.world_mut()
        .remove_resource::<HeadlessMatchState>()
        .and_then(|state| state.result)
        .ok_or_else(|| "headless match ended without a result".to_string())
}

/// Run a headless match with the given configuration
pub fn run_headless_match(config: HeadlessMatchConfig) -> Result<MatchResult, String> {
    config.validate()?;
    let catalog = load_spell_catalog().map_err(|e| e.to_string())?;

    println!("Starting headless match simulation...");
    println!("  Participants: {} (host {})", config.participants, config.host);
    println!("  Bots: {:?}", config.bot_styles());
    println!("  Arena: {}", config.arena);
    println!("  Mode: {:?}", config.mode);
    println!("  Max duration: {:.0}s", config.max_duration_secs);

    let app = build_headless_app(config, Arc::new(catalog), true);
    let result = run_to_completion(app)?;

    match result.winner {
        Some(winner) => println!("Winner: Avatar {} after {:.1}s", winner, result.match_time),
        None => println!("Draw after {:.1}s", result.match_time),
    }
    for avatar in &result.avatars {
        println!(
            "  Avatar {}: score {}, health {}, damage dealt {}, spell {}",
            avatar.id,
            avatar.score,
            avatar.final_health,
            avatar.damage_dealt,
            avatar.spell.as_deref().unwrap_or("-")
        );
    }
    if let Some(path) = &result.log_path {
        println!("Match complete. Log saved to: {}", path);
    }
    Ok(result)
}
