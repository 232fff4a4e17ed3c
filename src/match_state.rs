//! Match flow
//!
//! `Initiation -> PreGame -> Playing -> EndGame`, and back to `Initiation` only
//! through [`MatchStateMachine::reset`] when the session returns to the lobby.
//! Every participant keeps its own copy; only the host drives transitions and the
//! others follow the broadcasts.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::net::{AvatarId, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Waiting for every participant to report in
    #[default]
    Initiation,
    /// Avatars exist, countdown running
    PreGame,
    Playing,
    /// Winner declared, waiting to return to the lobby
    EndGame,
}

/// Win condition of a match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchMode {
    /// First avatar to reach `target` kills
    ScoreBased { target: u32 },
    /// Highest score once `duration` seconds have been played
    TimeBased { duration: f32 },
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::ScoreBased { target: 5 }
    }
}

/// Result of a readiness report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Already counted, or the match is past initiation
    Ignored,
    Waiting { ready: usize, expected: usize },
    /// This report completed the roster
    AllReady,
}

/// Session-wide match state.
#[derive(Resource, Debug, Clone)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    mode: MatchMode,
    expected: usize,
    ready: BTreeSet<ParticipantId>,
    start_time: Option<f32>,
    winner: Option<AvatarId>,
}

impl MatchStateMachine {
    pub fn new(mode: MatchMode, expected_participants: usize) -> Self {
        Self {
            phase: MatchPhase::Initiation,
            mode,
            expected: expected_participants,
            ready: BTreeSet::new(),
            start_time: None,
            winner: None,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn start_time(&self) -> Option<f32> {
        self.start_time
    }

    pub fn winner(&self) -> Option<AvatarId> {
        self.winner
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Count a readiness report. Duplicates from the same participant are ignored.
    pub fn acknowledge_ready(&mut self, participant: ParticipantId) -> ReadyOutcome {
        if self.phase != MatchPhase::Initiation || !self.ready.insert(participant) {
            return ReadyOutcome::Ignored;
        }
        if self.ready.len() >= self.expected {
            ReadyOutcome::AllReady
        } else {
            ReadyOutcome::Waiting {
                ready: self.ready.len(),
                expected: self.expected,
            }
        }
    }

    /// Initiation -> PreGame. Returns false from any other phase.
    pub fn enter_pregame(&mut self) -> bool {
        if self.phase != MatchPhase::Initiation {
            return false;
        }
        self.phase = MatchPhase::PreGame;
        true
    }

    /// PreGame -> Playing, stamping the start time.
    pub fn start(&mut self, now: f32) -> bool {
        if self.phase != MatchPhase::PreGame {
            return false;
        }
        self.phase = MatchPhase::Playing;
        self.start_time = Some(now);
        true
    }

    /// Check the win condition against `scores`, given in ascending avatar id
    /// order. The first avatar satisfying the condition wins ties.
    pub fn evaluate_win(
        &self,
        now: f32,
        scores: impl IntoIterator<Item = (AvatarId, u32)>,
    ) -> Option<AvatarId> {
        if self.phase != MatchPhase::Playing {
            return None;
        }
        match self.mode {
            MatchMode::ScoreBased { target } => scores
                .into_iter()
                .find(|(_, score)| *score >= target)
                .map(|(avatar, _)| avatar),
            MatchMode::TimeBased { duration } => {
                let start = self.start_time?;
                if now < start + duration {
                    return None;
                }
                scores
                    .into_iter()
                    .fold(None::<(AvatarId, u32)>, |best, (avatar, score)| match best {
                        Some((_, best_score)) if best_score >= score => best,
                        _ => Some((avatar, score)),
                    })
                    .map(|(avatar, _)| avatar)
            }
        }
    }

    /// Move to EndGame with `winner`. Returns false if a winner was already declared.
    pub fn declare_winner(&mut self, winner: AvatarId) -> bool {
        if self.phase == MatchPhase::EndGame {
            return false;
        }
        self.phase = MatchPhase::EndGame;
        self.winner = Some(winner);
        true
    }

    /// Seconds left in a running TimeBased match.
    pub fn time_remaining(&self, now: f32) -> Option<f32> {
        match (self.mode, self.phase, self.start_time) {
            (MatchMode::TimeBased { duration }, MatchPhase::Playing, Some(start)) => {
                Some((start + duration - now).max(0.0))
            }
            _ => None,
        }
    }

    /// Back to Initiation for the next match.
    pub fn reset(&mut self) {
        self.phase = MatchPhase::Initiation;
        self.ready.clear();
        self.start_time = None;
        self.winner = None;
    }
}
