//! Turn Scheduler
//!
//! Decides who speaks next, whether a finished autonomous turn chains into
//! another one, and when the round ceiling stops the panel. The scheduler is a
//! pure state machine: it never sleeps or spawns. Delays are returned to the
//! caller as [`NextTurn`] plans, and the caller reports back through
//! [`TurnScheduler::take_due`] and [`TurnScheduler::resolve_turn`].

use crate::{
    TimerId,
    error::SchedulerError,
    participant::{Participant, Roster},
    random::RandomSource,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Tunables for turn taking.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of successful autonomous contributions per session.
    pub max_rounds: u32,
    /// Probability that a successful turn chains into another speaker.
    pub chain_probability: f64,
    /// Delay range before a chained turn starts, `[min, max)`.
    pub chain_delay: (Duration, Duration),
    /// Delay range before the panel answers a human submit, `[min, max)`.
    pub reply_delay: (Duration, Duration),
    /// Silence after which the opener starts the discussion.
    pub startup_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            chain_probability: 0.45,
            chain_delay: (Duration::from_millis(1000), Duration::from_millis(3000)),
            reply_delay: (Duration::from_millis(1000), Duration::from_millis(2500)),
            startup_grace: Duration::from_millis(3000),
        }
    }
}

/// Why a turn was started.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnTrigger {
    /// Nobody spoke during the startup grace period.
    Opening,
    /// The human submitted a message.
    Reply,
    /// A previous autonomous turn chained into this one.
    Chain,
}

/// An autonomous participant currently producing a contribution.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: u64,
    pub speaker_id: String,
    pub trigger: TurnTrigger,
    pub started_at: DateTime<Utc>,
    /// True while the generation call is outstanding.
    pub pending: bool,
}

/// The scheduler's observable state.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub round_count: u32,
    pub active_turn: Option<Turn>,
    pub ceiling_reached: bool,
}

/// Coarse view of [`SchedulerState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TurnInFlight { speaker_id: String },
    Ceiling,
}

/// A turn the scheduler wants started after `delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct NextTurn {
    pub speaker_id: String,
    pub trigger: TurnTrigger,
    pub delay: Duration,
}

/// A planned turn waiting on its timer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTurn {
    pub speaker_id: String,
    pub trigger: TurnTrigger,
    pub timer: TimerId,
    /// The timer fired while another turn was in flight.
    pub deferred: bool,
}

/// Result of a queued timer firing.
#[derive(Debug, Clone, PartialEq)]
pub enum Due {
    /// Start this turn now.
    Ready(QueuedTurn),
    /// Another turn is in flight; the queued turn starts when it resolves.
    Deferred,
    /// The timer no longer matches a queued turn.
    Stale,
}

/// What the caller should do once a turn resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// Nothing to start.
    None,
    /// A deferred queued turn is ready and should start immediately.
    StartNow(QueuedTurn),
    /// Arm a timer for this chained turn.
    Queue(NextTurn),
}

/// Outcome of [`TurnScheduler::resolve_turn`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub turn: Turn,
    /// Whether the turn consumed a round.
    pub counted: bool,
    pub follow_up: FollowUp,
    /// A queued turn dropped because the ceiling was reached. Its timer is stale.
    pub dropped: Option<QueuedTurn>,
}

/// Owns [`SchedulerState`] and every transition on it.
#[derive(Debug)]
pub struct TurnScheduler {
    config: SchedulerConfig,
    state: SchedulerState,
    queued: Option<QueuedTurn>,
    next_turn_id: u64,
    opened: bool,
    finished: bool,
}

impl TurnScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let state = SchedulerState {
            ceiling_reached: config.max_rounds == 0,
            ..SchedulerState::default()
        };
        Self {
            config,
            state,
            queued: None,
            next_turn_id: 0,
            opened: false,
            finished: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn queued(&self) -> Option<&QueuedTurn> {
        self.queued.as_ref()
    }

    pub fn phase(&self) -> Phase {
        match &self.state.active_turn {
            Some(turn) => Phase::TurnInFlight {
                speaker_id: turn.speaker_id.clone(),
            },
            None if self.state.ceiling_reached => Phase::Ceiling,
            None => Phase::Idle,
        }
    }

    /// True while an autonomous generation is outstanding.
    pub fn is_generating(&self) -> bool {
        self.state
            .active_turn
            .as_ref()
            .is_some_and(|turn| turn.pending)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn accepts_turns(&self) -> bool {
        !self.finished && !self.state.ceiling_reached
    }

    /// The speaker who should open an untouched discussion, if the panel may
    /// still open on its own.
    pub fn plan_opening<'r>(&self, roster: &'r Roster) -> Option<&'r Participant> {
        if !self.accepts_turns()
            || self.opened
            || self.state.active_turn.is_some()
            || self.queued.is_some()
        {
            return None;
        }
        roster.opener()
    }

    /// Plans the panel's answer to a human submit: any roster member, uniformly.
    pub fn plan_reply(&self, roster: &Roster, rng: &mut dyn RandomSource) -> Option<NextTurn> {
        if !self.accepts_turns() || roster.is_empty() {
            return None;
        }
        let speaker = &roster.members()[rng.pick(roster.len())];
        let (min, max) = self.config.reply_delay;
        Some(NextTurn {
            speaker_id: speaker.id.clone(),
            trigger: TurnTrigger::Reply,
            delay: rng.delay(min, max),
        })
    }

    /// Runs the chaining trial after a successful turn by `previous`.
    fn plan_chain(
        &self,
        previous: &str,
        roster: &Roster,
        rng: &mut dyn RandomSource,
    ) -> Option<NextTurn> {
        if !self.accepts_turns() || self.state.round_count >= self.config.max_rounds {
            return None;
        }
        if !rng.chance(self.config.chain_probability) {
            return None;
        }
        let others: Vec<&Participant> = roster
            .members()
            .iter()
            .filter(|p| p.id != previous)
            .collect();
        if others.is_empty() {
            return None;
        }
        let speaker = others[rng.pick(others.len())];
        let (min, max) = self.config.chain_delay;
        Some(NextTurn {
            speaker_id: speaker.id.clone(),
            trigger: TurnTrigger::Chain,
            delay: rng.delay(min, max),
        })
    }

    /// Records that `next` will start when `timer` fires. Returns the queued
    /// turn it supersedes, whose timer the caller should cancel.
    pub fn queue(&mut self, next: NextTurn, timer: TimerId) -> Option<QueuedTurn> {
        debug!(speaker = %next.speaker_id, trigger = ?next.trigger, delay_ms = next.delay.as_millis() as u64, "Queued next turn");
        self.queued.replace(QueuedTurn {
            speaker_id: next.speaker_id,
            trigger: next.trigger,
            timer,
            deferred: false,
        })
    }

    /// Handles a queued turn's timer firing.
    pub fn take_due(&mut self, timer: TimerId) -> Due {
        if self.queued.as_ref().is_none_or(|q| q.timer != timer) {
            return Due::Stale;
        }
        if !self.accepts_turns() {
            self.queued = None;
            return Due::Stale;
        }
        if self.state.active_turn.is_some() {
            if let Some(queued) = self.queued.as_mut() {
                debug!(speaker = %queued.speaker_id, "Queued turn deferred behind in-flight turn");
                queued.deferred = true;
            }
            return Due::Deferred;
        }
        match self.queued.take() {
            Some(queued) => Due::Ready(queued),
            None => Due::Stale,
        }
    }

    /// Starts a turn for `speaker_id`.
    pub fn begin_turn(
        &mut self,
        speaker_id: &str,
        trigger: TurnTrigger,
        roster: &Roster,
    ) -> Result<Turn, SchedulerError> {
        if self.finished {
            return Err(SchedulerError::Finished);
        }
        if let Some(active) = &self.state.active_turn {
            return Err(SchedulerError::Busy(active.speaker_id.clone()));
        }
        if self.state.ceiling_reached {
            return Err(SchedulerError::CeilingReached);
        }
        if roster.get(speaker_id).is_none() {
            return Err(SchedulerError::UnknownParticipant(speaker_id.to_string()));
        }

        self.next_turn_id += 1;
        let turn = Turn {
            id: self.next_turn_id,
            speaker_id: speaker_id.to_string(),
            trigger,
            started_at: Utc::now(),
            pending: true,
        };
        self.opened = true;
        self.state.active_turn = Some(turn.clone());
        info!(turn_id = turn.id, speaker = %speaker_id, ?trigger, round = self.state.round_count, "Turn started");
        Ok(turn)
    }

    /// Resolves the active turn. Only a successful turn consumes a round.
    pub fn resolve_turn(
        &mut self,
        turn_id: u64,
        succeeded: bool,
        roster: &Roster,
        rng: &mut dyn RandomSource,
    ) -> Result<Resolution, SchedulerError> {
        let turn = match self.state.active_turn.take() {
            Some(turn) if turn.id == turn_id => turn,
            other => {
                self.state.active_turn = other;
                return Err(SchedulerError::UnknownTurn(turn_id));
            }
        };

        if succeeded {
            self.state.round_count = (self.state.round_count + 1).min(self.config.max_rounds);
            if self.state.round_count >= self.config.max_rounds {
                self.state.ceiling_reached = true;
                info!(rounds = self.state.round_count, "Round ceiling reached");
            }
        }

        let mut dropped = None;
        let follow_up = if self.state.ceiling_reached {
            dropped = self.queued.take();
            FollowUp::None
        } else {
            match self.queued.take() {
                Some(queued) if queued.deferred => FollowUp::StartNow(queued),
                Some(queued) => {
                    // A reply is already owed; it wins over a chain.
                    self.queued = Some(queued);
                    FollowUp::None
                }
                None if succeeded => match self.plan_chain(&turn.speaker_id, roster, rng) {
                    Some(next) => FollowUp::Queue(next),
                    None => FollowUp::None,
                },
                None => FollowUp::None,
            }
        };

        info!(
            turn_id,
            speaker = %turn.speaker_id,
            succeeded,
            rounds = self.state.round_count,
            "Turn resolved"
        );
        Ok(Resolution {
            turn,
            counted: succeeded,
            follow_up,
            dropped,
        })
    }

    /// Stops the scheduler for good. The active turn is abandoned and any
    /// queued turn is returned so its timer can be cancelled.
    pub fn finish(&mut self) -> Option<QueuedTurn> {
        self.finished = true;
        if let Some(turn) = self.state.active_turn.take() {
            debug!(turn_id = turn.id, "Abandoning in-flight turn at finish");
        }
        self.queued.take()
    }
}
