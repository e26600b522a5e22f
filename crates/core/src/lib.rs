//! Crossfire core: the turn-taking engine behind a simulated group interview.
//!
//! The [`engine::DiscussionEngine`] is a single-threaded state machine that
//! consumes [`engine::SessionEvent`]s and answers with [`Command`]s. The
//! [`runtime`] module drives it on tokio.

pub mod casebook;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod generator;
pub mod input;
pub mod interruption;
pub mod llm_client;
pub mod participant;
pub mod random;
pub mod runtime;
pub mod scheduler;
pub mod transcript;

use engine::SessionUpdate;
use participant::Participant;
use std::time::Duration;
use transcript::Contribution;

/// Identifies one timer armed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Everything a generator needs for one turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub turn_id: u64,
    pub participant: Participant,
    pub topic: String,
    pub job_title: String,
    pub history: Vec<Contribution>,
}

/// Represents commands that the engine issues to an external runtime.
///
/// This enum decouples the engine's decisions from the execution of side
/// effects (sleeping, calling a provider, notifying a client), so the engine
/// itself stays synchronous and deterministic.
#[derive(Debug, Clone)]
pub enum Command {
    /// Deliver `TimerFired(id)` after `delay`.
    StartTimer { id: TimerId, delay: Duration },
    /// Drop a timer that has not fired yet.
    CancelTimer(TimerId),
    /// Run one generation call and report the result back.
    Generate(GenerationRequest),
    /// Forward an update to whoever is watching the session.
    Publish(SessionUpdate),
}
