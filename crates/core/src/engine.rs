//! Discussion Engine
//!
//! The single cooperative dispatcher of a session. Every timer, generation
//! result and human input arrives as a [`SessionEvent`] and is handled to
//! completion before the next one, so no state is ever shared or locked. The
//! engine owns the scheduler, transcript, interruption detector and input
//! capture, and only reports side effects as [`Command`]s.

use crate::{
    Command, GenerationRequest, TimerId,
    error::{DictationError, GenerationError, InputError},
    input::{DictationUpdate, InputCapture, PendingInput},
    interruption::{DEFAULT_INTERRUPTION_WINDOW, InterruptionDetector, InterruptionEvent},
    participant::Roster,
    random::RandomSource,
    scheduler::{
        Due, FollowUp, NextTurn, Phase, SchedulerConfig, SchedulerState, Turn, TurnScheduler,
        TurnTrigger,
    },
    transcript::{Contribution, Transcript},
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-session tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub interruption_window: Duration,
    /// Number of recent contributions handed to the generator.
    pub history_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            interruption_window: DEFAULT_INTERRUPTION_WINDOW,
            history_window: 5,
        }
    }
}

/// Human-side input events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// The full contents of the text box after an edit.
    Typed(String),
    StartDictation,
    StopDictation,
    Dictation(DictationUpdate),
    DictationFailed(DictationError),
    Submit,
    Finish,
}

/// Everything the engine reacts to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Input(SessionInput),
    TimerFired(TimerId),
    GenerationResolved {
        turn_id: u64,
        result: Result<String, GenerationError>,
    },
}

/// Notifications for whoever renders the session.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    TurnStarted {
        turn: Turn,
    },
    TurnEnded {
        turn_id: u64,
        speaker_id: String,
        succeeded: bool,
    },
    Contribution {
        contribution: Contribution,
    },
    Rounds {
        round_count: u32,
        max_rounds: u32,
        ceiling_reached: bool,
    },
    Interruption {
        event: InterruptionEvent,
    },
    Input {
        pending: PendingInput,
    },
    Rejected {
        reason: String,
    },
    Finished {
        transcript: Vec<Contribution>,
        interruptions: u32,
        round_count: u32,
    },
}

pub struct DiscussionEngine {
    config: EngineConfig,
    topic: String,
    job_title: String,
    roster: Roster,
    scheduler: TurnScheduler,
    transcript: Transcript,
    interruptions: InterruptionDetector,
    input: InputCapture,
    rng: Box<dyn RandomSource>,
    next_timer: u64,
    startup_timer: Option<TimerId>,
    interruption_timer: Option<TimerId>,
    started: bool,
    finished: bool,
}

impl DiscussionEngine {
    pub fn new(
        topic: impl Into<String>,
        job_title: impl Into<String>,
        roster: Roster,
        config: EngineConfig,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            scheduler: TurnScheduler::new(config.scheduler.clone()),
            interruptions: InterruptionDetector::new(config.interruption_window),
            config,
            topic: topic.into(),
            job_title: job_title.into(),
            roster,
            transcript: Transcript::new(),
            input: InputCapture::new(),
            rng,
            next_timer: 0,
            startup_timer: None,
            interruption_timer: None,
            started: false,
            finished: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn scheduler_state(&self) -> &SchedulerState {
        self.scheduler.state()
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn pending_input(&self) -> &PendingInput {
        self.input.pending()
    }

    pub fn interruption(&self, now: Instant) -> InterruptionEvent {
        self.interruptions.snapshot(now)
    }

    pub fn interruption_count(&self) -> u32 {
        self.interruptions.total()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn alloc_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    /// Arms the startup grace timer.
    pub fn start(&mut self) -> Vec<Command> {
        if self.started || self.finished {
            return Vec::new();
        }
        self.started = true;
        let id = self.alloc_timer();
        self.startup_timer = Some(id);
        info!(topic = %self.topic, job_title = %self.job_title, speakers = self.roster.len(), "Discussion started");
        vec![Command::StartTimer {
            id,
            delay: self.config.scheduler.startup_grace,
        }]
    }

    /// Dispatches one event.
    pub fn handle(&mut self, event: SessionEvent, now: Instant) -> Vec<Command> {
        match event {
            SessionEvent::Input(input) => self.on_input(input, now),
            SessionEvent::TimerFired(id) => self.on_timer(id, now),
            SessionEvent::GenerationResolved { turn_id, result } => {
                self.on_generation(turn_id, result)
            }
        }
    }

    pub fn on_input(&mut self, input: SessionInput, now: Instant) -> Vec<Command> {
        if self.finished {
            debug!(?input, "Ignoring input after finish");
            return match input {
                SessionInput::Submit => vec![Self::rejected(InputError::SessionFinished)],
                _ => Vec::new(),
            };
        }

        let mut out = Vec::new();
        match input {
            SessionInput::Typed(text) => {
                self.input.set_text(text);
                out.push(self.publish_input());
            }
            SessionInput::StartDictation => {
                if self.input.start_dictation() {
                    self.cancel_startup(&mut out);
                    out.push(self.publish_input());
                }
            }
            SessionInput::StopDictation => {
                self.input.stop_dictation();
                out.push(self.publish_input());
            }
            SessionInput::Dictation(update) => {
                if self.input.apply_dictation(update) {
                    out.push(self.publish_input());
                }
            }
            SessionInput::DictationFailed(error) => {
                if self.input.dictation_failed(&error) {
                    out.push(self.publish_input());
                }
            }
            SessionInput::Submit => match self.submit(now) {
                Ok(commands) => out.extend(commands),
                Err(e) => {
                    warn!(error = %e, "Submit rejected");
                    out.push(Self::rejected(e));
                }
            },
            SessionInput::Finish => out.extend(self.finish()),
        }
        out
    }

    /// Submits the pending input as a human contribution.
    ///
    /// The interruption check reads the scheduler before anything else
    /// changes, and an in-flight generation is left running.
    pub fn submit(&mut self, now: Instant) -> Result<Vec<Command>, InputError> {
        if self.finished {
            return Err(InputError::SessionFinished);
        }
        let text = self.input.take_submission()?;
        let mut out = Vec::new();
        self.cancel_startup(&mut out);

        if self
            .interruptions
            .observe_submit(self.scheduler.is_generating(), now)
        {
            if let Some(old) = self.interruption_timer.take() {
                out.push(Command::CancelTimer(old));
            }
            let id = self.alloc_timer();
            self.interruption_timer = Some(id);
            out.push(Command::StartTimer {
                id,
                delay: self.interruptions.window(),
            });
            out.push(Command::Publish(SessionUpdate::Interruption {
                event: self.interruptions.snapshot(now),
            }));
        }

        self.transcript.append_human(text);
        if let Some(contribution) = self.transcript.last() {
            info!(id = contribution.id, len = contribution.text.chars().count(), "Human contribution recorded");
            out.push(Command::Publish(SessionUpdate::Contribution {
                contribution: contribution.clone(),
            }));
        }
        out.push(self.publish_input());

        match self.scheduler.plan_reply(&self.roster, self.rng.as_mut()) {
            Some(next) => self.queue_turn(next, &mut out),
            None => debug!("No reply scheduled: round ceiling reached"),
        }
        Ok(out)
    }

    pub fn on_timer(&mut self, id: TimerId, now: Instant) -> Vec<Command> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        if self.startup_timer == Some(id) {
            self.startup_timer = None;
            if self.input.has_activity() || !self.transcript.is_empty() {
                debug!("Startup grace elapsed with human activity; panel waits");
                return out;
            }
            if let Some(opener) = self.scheduler.plan_opening(&self.roster) {
                let speaker_id = opener.id.clone();
                info!(speaker = %speaker_id, "Nobody spoke; opener takes the floor");
                self.start_turn(&speaker_id, TurnTrigger::Opening, &mut out);
            }
            return out;
        }

        if self.interruption_timer == Some(id) {
            self.interruption_timer = None;
            if self.interruptions.expire(now) {
                out.push(Command::Publish(SessionUpdate::Interruption {
                    event: self.interruptions.snapshot(now),
                }));
            }
            return out;
        }

        match self.scheduler.take_due(id) {
            Due::Ready(queued) => self.start_turn(&queued.speaker_id, queued.trigger, &mut out),
            Due::Deferred => {}
            Due::Stale => debug!(timer = id.0, "Ignoring stale timer"),
        }
        out
    }

    pub fn on_generation(
        &mut self,
        turn_id: u64,
        result: Result<String, GenerationError>,
    ) -> Vec<Command> {
        let mut out = Vec::new();
        if self.finished {
            info!(turn_id, "Discarding generation result that arrived after finish");
            return out;
        }

        let text = match result {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(turn_id, "Generation returned empty text; skipping turn");
                None
            }
            Err(e) => {
                warn!(turn_id, error = %e, "Generation failed; skipping turn");
                None
            }
        };

        let resolution = match self.scheduler.resolve_turn(
            turn_id,
            text.is_some(),
            &self.roster,
            self.rng.as_mut(),
        ) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(turn_id, error = %e, "Discarding generation result");
                return out;
            }
        };

        out.push(Command::Publish(SessionUpdate::TurnEnded {
            turn_id,
            speaker_id: resolution.turn.speaker_id.clone(),
            succeeded: resolution.counted,
        }));

        if let (Some(text), Some(speaker)) = (text, self.roster.get(&resolution.turn.speaker_id)) {
            self.transcript.append_agent(speaker, text);
            if let Some(contribution) = self.transcript.last() {
                out.push(Command::Publish(SessionUpdate::Contribution {
                    contribution: contribution.clone(),
                }));
            }
            out.push(self.publish_rounds());
        }

        if let Some(dropped) = resolution.dropped {
            out.push(Command::CancelTimer(dropped.timer));
        }
        match resolution.follow_up {
            FollowUp::None => {}
            FollowUp::StartNow(queued) => {
                self.start_turn(&queued.speaker_id, queued.trigger, &mut out)
            }
            FollowUp::Queue(next) => self.queue_turn(next, &mut out),
        }
        out
    }

    /// Ends the session and hands over the transcript. Pending timers are
    /// cancelled; a generation still in flight will be discarded on arrival.
    pub fn finish(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.finished = true;

        if let Some(queued) = self.scheduler.finish() {
            out.push(Command::CancelTimer(queued.timer));
        }
        self.cancel_startup(&mut out);
        if let Some(id) = self.interruption_timer.take() {
            out.push(Command::CancelTimer(id));
        }
        self.input.stop_dictation();

        info!(
            contributions = self.transcript.len(),
            rounds = self.scheduler.state().round_count,
            interruptions = self.interruptions.total(),
            "Discussion finished"
        );
        out.push(Command::Publish(SessionUpdate::Finished {
            transcript: self.transcript.all().to_vec(),
            interruptions: self.interruptions.total(),
            round_count: self.scheduler.state().round_count,
        }));
        out
    }

    fn start_turn(&mut self, speaker_id: &str, trigger: TurnTrigger, out: &mut Vec<Command>) {
        let turn = match self.scheduler.begin_turn(speaker_id, trigger, &self.roster) {
            Ok(turn) => turn,
            Err(e) => {
                warn!(speaker = %speaker_id, error = %e, "Could not start turn");
                return;
            }
        };
        let Some(participant) = self.roster.get(speaker_id).cloned() else {
            return;
        };
        out.push(Command::Publish(SessionUpdate::TurnStarted { turn: turn.clone() }));
        out.push(Command::Generate(GenerationRequest {
            turn_id: turn.id,
            participant,
            topic: self.topic.clone(),
            job_title: self.job_title.clone(),
            history: self.transcript.latest(self.config.history_window).to_vec(),
        }));
    }

    fn queue_turn(&mut self, next: NextTurn, out: &mut Vec<Command>) {
        let id = self.alloc_timer();
        let delay = next.delay;
        if let Some(displaced) = self.scheduler.queue(next, id) {
            out.push(Command::CancelTimer(displaced.timer));
        }
        out.push(Command::StartTimer { id, delay });
    }

    fn cancel_startup(&mut self, out: &mut Vec<Command>) {
        if let Some(id) = self.startup_timer.take() {
            out.push(Command::CancelTimer(id));
        }
    }

    fn publish_input(&self) -> Command {
        Command::Publish(SessionUpdate::Input {
            pending: self.input.pending().clone(),
        })
    }

    fn publish_rounds(&self) -> Command {
        let state = self.scheduler.state();
        Command::Publish(SessionUpdate::Rounds {
            round_count: state.round_count,
            max_rounds: self.config.scheduler.max_rounds,
            ceiling_reached: state.ceiling_reached,
        })
    }

    fn rejected(error: InputError) -> Command {
        Command::Publish(SessionUpdate::Rejected {
            reason: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{participant::HUMAN_ID, random::testing::ScriptedRandom};

    fn engine_with(config: EngineConfig, rng: ScriptedRandom) -> DiscussionEngine {
        DiscussionEngine::new(
            "新品上市优先级",
            "产品经理",
            Roster::default(),
            config,
            Box::new(rng),
        )
    }

    fn engine() -> DiscussionEngine {
        engine_with(EngineConfig::default(), ScriptedRandom::default())
    }

    fn timers(cmds: &[Command]) -> Vec<(TimerId, Duration)> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::StartTimer { id, delay } => Some((*id, *delay)),
                _ => None,
            })
            .collect()
    }

    fn cancelled(cmds: &[Command]) -> Vec<TimerId> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::CancelTimer(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn generations(cmds: &[Command]) -> Vec<GenerationRequest> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Generate(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    fn updates(cmds: &[Command]) -> Vec<SessionUpdate> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Publish(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    fn type_and_submit(engine: &mut DiscussionEngine, text: &str, now: Instant) -> Vec<Command> {
        engine.on_input(SessionInput::Typed(text.to_string()), now);
        engine.on_input(SessionInput::Submit, now)
    }

    /// Fires the startup timer and returns the opener's generation request.
    fn open(engine: &mut DiscussionEngine, now: Instant) -> GenerationRequest {
        let start = engine.start();
        let (startup, _) = timers(&start)[0];
        let cmds = engine.on_timer(startup, now);
        generations(&cmds).remove(0)
    }

    #[test]
    fn test_silent_start_opens_with_aggressive_speaker() {
        let mut engine = engine();
        let now = Instant::now();
        let start = engine.start();
        assert_eq!(timers(&start), vec![(TimerId(1), Duration::from_millis(3000))]);

        let cmds = engine.on_timer(TimerId(1), now);
        let reqs = generations(&cmds);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].participant.id, "char1");
        assert!(reqs[0].history.is_empty());
        assert_eq!(
            engine.phase(),
            Phase::TurnInFlight {
                speaker_id: "char1".to_string()
            }
        );

        let cmds = engine.on_generation(reqs[0].turn_id, Ok("我认为分三步走".to_string()));
        assert_eq!(engine.scheduler_state().round_count, 1);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.transcript().len(), 1);
        assert!(updates(&cmds).contains(&SessionUpdate::Rounds {
            round_count: 1,
            max_rounds: 20,
            ceiling_reached: false,
        }));
    }

    #[test]
    fn test_human_activity_suppresses_opening() {
        let mut engine = engine();
        let now = Instant::now();
        engine.start();
        engine.on_input(SessionInput::Typed("我先".to_string()), now);
        let cmds = engine.on_timer(TimerId(1), now);
        assert!(generations(&cmds).is_empty());
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_dictation_cancels_startup_timer() {
        let mut engine = engine();
        let now = Instant::now();
        engine.start();
        let cmds = engine.on_input(SessionInput::StartDictation, now);
        assert_eq!(cancelled(&cmds), vec![TimerId(1)]);
        assert!(generations(&engine.on_timer(TimerId(1), now)).is_empty());
        // Starting twice changes nothing.
        assert!(engine.on_input(SessionInput::StartDictation, now).is_empty());
    }

    #[test]
    fn test_submit_during_turn_raises_interruption_and_keeps_generation() {
        let mut engine = engine();
        let now = Instant::now();
        let req = open(&mut engine, now);

        let cmds = type_and_submit(&mut engine, "hello", now);
        let ups = updates(&cmds);
        assert!(ups.iter().any(|u| matches!(
            u,
            SessionUpdate::Interruption { event } if event.occurred
        )));
        assert!(engine.interruption(now).occurred);
        assert_eq!(engine.interruption_count(), 1);
        // The in-flight turn is untouched.
        assert!(engine.scheduler_state().active_turn.is_some());

        // Interruption timer (2000ms) plus the reply timer.
        let armed = timers(&cmds);
        assert_eq!(armed.len(), 2);
        let (interruption_timer, window) = armed[0];
        assert_eq!(window, Duration::from_millis(2000));
        assert_eq!(armed[1].1, Duration::from_millis(1000));

        // The agent result lands after the human entry.
        engine.on_generation(req.turn_id, Ok("先定框架".to_string()));
        let speakers: Vec<_> = engine
            .transcript()
            .all()
            .iter()
            .map(|c| c.speaker_id.clone())
            .collect();
        assert_eq!(speakers, vec![HUMAN_ID.to_string(), "char1".to_string()]);

        let later = now + Duration::from_millis(2000);
        assert!(!engine.interruption(later).occurred);
        let cmds = engine.on_timer(interruption_timer, later);
        assert!(updates(&cmds).iter().any(|u| matches!(
            u,
            SessionUpdate::Interruption { event } if !event.occurred
        )));
    }

    #[test]
    fn test_submit_while_idle_is_not_an_interruption() {
        let mut engine = engine();
        let now = Instant::now();
        engine.start();
        let cmds = type_and_submit(&mut engine, "我先说", now);
        assert!(!updates(&cmds)
            .iter()
            .any(|u| matches!(u, SessionUpdate::Interruption { .. })));
        assert_eq!(engine.interruption_count(), 0);
        // Startup timer cancelled, reply timer armed.
        assert_eq!(cancelled(&cmds), vec![TimerId(1)]);
        assert_eq!(timers(&cmds).len(), 1);
    }

    #[test]
    fn test_reply_timer_starts_turn_with_recent_history() {
        let mut engine = engine_with(EngineConfig::default(), ScriptedRandom::new(&[], &[2]));
        let now = Instant::now();
        engine.start();
        let cmds = type_and_submit(&mut engine, "我先说", now);
        let (reply_timer, _) = timers(&cmds)[0];

        let cmds = engine.on_timer(reply_timer, now);
        let reqs = generations(&cmds);
        assert_eq!(reqs[0].participant.id, "char3");
        assert_eq!(reqs[0].history.len(), 1);
        assert_eq!(reqs[0].history[0].text, "我先说");
    }

    #[test]
    fn test_empty_submit_rejected_without_state_change() {
        let mut engine = engine();
        let now = Instant::now();
        engine.start();
        let cmds = type_and_submit(&mut engine, "   ", now);
        assert_eq!(
            updates(&cmds),
            vec![SessionUpdate::Rejected {
                reason: "Cannot submit an empty message".to_string()
            }]
        );
        assert!(engine.transcript().is_empty());
        assert_eq!(engine.pending_input().buffer, "   ");
        assert!(timers(&cmds).is_empty());
    }

    #[test]
    fn test_dictation_interim_never_submitted() {
        let mut engine = engine();
        let now = Instant::now();
        engine.start();
        engine.on_input(SessionInput::StartDictation, now);
        engine.on_input(
            SessionInput::Dictation(DictationUpdate {
                final_segments: vec![],
                interim_text: "你".to_string(),
            }),
            now,
        );
        engine.on_input(
            SessionInput::Dictation(DictationUpdate {
                final_segments: vec!["你好".to_string()],
                interim_text: String::new(),
            }),
            now,
        );
        assert_eq!(engine.pending_input().buffer, "你好");
        engine.on_input(SessionInput::Submit, now);
        assert_eq!(engine.transcript().all()[0].text, "你好");
        assert!(!engine.pending_input().listening);
    }

    #[test]
    fn test_dictation_error_forces_listening_off() {
        let mut engine = engine();
        let now = Instant::now();
        engine.on_input(SessionInput::StartDictation, now);
        let cmds = engine.on_input(SessionInput::DictationFailed(DictationError::NoSpeech), now);
        assert!(cmds.is_empty());
        assert!(engine.pending_input().listening);
        engine.on_input(
            SessionInput::DictationFailed(DictationError::Other("audio-capture".into())),
            now,
        );
        assert!(!engine.pending_input().listening);
    }

    #[test]
    fn test_failed_generation_is_silent_no_op() {
        let mut engine = engine();
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = engine.on_generation(
            req.turn_id,
            Err(GenerationError::Provider("timeout".to_string())),
        );
        assert!(engine.transcript().is_empty());
        assert_eq!(engine.scheduler_state().round_count, 0);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(
            updates(&cmds),
            vec![SessionUpdate::TurnEnded {
                turn_id: req.turn_id,
                speaker_id: "char1".to_string(),
                succeeded: false,
            }]
        );
    }

    #[test]
    fn test_success_can_chain_to_another_speaker() {
        let mut engine = engine_with(EngineConfig::default(), ScriptedRandom::new(&[true], &[0]));
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = engine.on_generation(req.turn_id, Ok("框架".to_string()));
        let armed = timers(&cmds);
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].1, Duration::from_millis(1000));

        let cmds = engine.on_timer(armed[0].0, now);
        let reqs = generations(&cmds);
        // Roster minus char1, first pick.
        assert_eq!(reqs[0].participant.id, "char2");
        assert_eq!(reqs[0].history.len(), 1);
    }

    #[test]
    fn test_reply_due_during_turn_is_deferred() {
        let mut engine = engine_with(EngineConfig::default(), ScriptedRandom::new(&[], &[1]));
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = type_and_submit(&mut engine, "插一句", now);
        let (reply_timer, _) = *timers(&cmds).last().unwrap();

        assert!(generations(&engine.on_timer(reply_timer, now)).is_empty());

        let cmds = engine.on_generation(req.turn_id, Ok("好的".to_string()));
        let reqs = generations(&cmds);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].participant.id, "char2");
        assert_eq!(reqs[0].history.len(), 2);
    }

    #[test]
    fn test_submit_during_chain_delay_replaces_chain() {
        let mut engine = engine_with(EngineConfig::default(), ScriptedRandom::new(&[true], &[0, 2]));
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = engine.on_generation(req.turn_id, Ok("框架".to_string()));
        let (chain_timer, _) = timers(&cmds)[0];

        let cmds = type_and_submit(&mut engine, "我不同意", now);
        assert_eq!(cancelled(&cmds), vec![chain_timer]);
        let armed = timers(&cmds);
        assert_eq!(armed.len(), 1);
        let (reply_timer, delay) = armed[0];
        assert_ne!(reply_timer, chain_timer);
        assert_eq!(delay, Duration::from_millis(1000));
        assert!(!updates(&cmds).iter().any(|u| matches!(u, SessionUpdate::Interruption { .. })));

        // A late chain expiry must not start char2.
        assert!(generations(&engine.on_timer(chain_timer, now)).is_empty());
        assert_eq!(engine.phase(), Phase::Idle);

        let reqs = generations(&engine.on_timer(reply_timer, now));
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].participant.id, "char3");
        assert_eq!(reqs[0].history.len(), 2);
    }

    #[test]
    fn test_reply_queued_during_final_round_is_dropped() {
        let config = EngineConfig {
            scheduler: SchedulerConfig {
                max_rounds: 1,
                ..SchedulerConfig::default()
            },
            ..EngineConfig::default()
        };
        let mut engine = engine_with(config, ScriptedRandom::new(&[], &[1]));
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = type_and_submit(&mut engine, "插一句", now);
        let (reply_timer, _) = *timers(&cmds).last().unwrap();

        let cmds = engine.on_generation(req.turn_id, Ok("最后一轮".to_string()));
        assert_eq!(cancelled(&cmds), vec![reply_timer]);
        assert!(timers(&cmds).is_empty());
        assert!(generations(&cmds).is_empty());
        assert_eq!(engine.phase(), Phase::Ceiling);

        assert!(generations(&engine.on_timer(reply_timer, now)).is_empty());
        assert_eq!(engine.phase(), Phase::Ceiling);
        assert_eq!(engine.scheduler_state().round_count, 1);
    }

    #[test]
    fn test_ceiling_accepts_submit_but_schedules_nothing() {
        let config = EngineConfig {
            scheduler: SchedulerConfig {
                max_rounds: 1,
                ..SchedulerConfig::default()
            },
            ..EngineConfig::default()
        };
        let mut engine = engine_with(config, ScriptedRandom::new(&[true], &[]));
        let now = Instant::now();
        let req = open(&mut engine, now);
        let cmds = engine.on_generation(req.turn_id, Ok("结束".to_string()));
        assert!(timers(&cmds).is_empty());
        assert_eq!(engine.phase(), Phase::Ceiling);

        let cmds = type_and_submit(&mut engine, "我补充", now);
        assert_eq!(engine.transcript().len(), 2);
        assert!(timers(&cmds).is_empty());
        assert!(generations(&cmds).is_empty());
        assert_eq!(engine.scheduler_state().round_count, 1);
    }

    #[test]
    fn test_finish_cancels_timers_and_discards_late_results() {
        let mut engine = engine();
        let now = Instant::now();
        let req = open(&mut engine, now);
        let submit = type_and_submit(&mut engine, "hello", now);
        let armed: Vec<TimerId> = timers(&submit).into_iter().map(|(id, _)| id).collect();

        let cmds = engine.on_input(SessionInput::Finish, now);
        let mut dropped = cancelled(&cmds);
        dropped.sort();
        assert_eq!(dropped, armed);
        match updates(&cmds).last() {
            Some(SessionUpdate::Finished {
                transcript,
                interruptions,
                round_count,
            }) => {
                assert_eq!(transcript.len(), 1);
                assert_eq!(*interruptions, 1);
                assert_eq!(*round_count, 0);
            }
            other => panic!("expected Finished, got {:?}", other),
        }

        assert!(engine.on_generation(req.turn_id, Ok("迟到".to_string())).is_empty());
        assert_eq!(engine.transcript().len(), 1);
        assert!(engine.on_timer(armed[1], now).is_empty());
        assert!(engine.finish().is_empty());
        assert_eq!(
            updates(&engine.on_input(SessionInput::Submit, now)),
            vec![SessionUpdate::Rejected {
                reason: "The session has already finished".to_string()
            }]
        );
    }

    #[test]
    fn test_rounds_never_exceed_ceiling_under_mixed_events() {
        let mut engine = engine_with(
            EngineConfig::default(),
            ScriptedRandom::new(&[true; 64], &[0, 1, 2, 1, 0, 2, 1]),
        );
        let mut now = Instant::now();
        let mut pending: Vec<TimerId> = engine.start().iter().filter_map(|c| match c {
            Command::StartTimer { id, .. } => Some(*id),
            _ => None,
        }).collect();
        let mut in_flight: Vec<u64> = Vec::new();

        for step in 0..400 {
            now += Duration::from_millis(500);
            let cmds = if step % 7 == 3 {
                type_and_submit(&mut engine, "插话", now)
            } else if let Some(turn_id) = in_flight.pop() {
                engine.on_generation(turn_id, Ok(format!("第{}轮", step)))
            } else if !pending.is_empty() {
                let id = pending.remove(0);
                engine.on_timer(id, now)
            } else {
                Vec::new()
            };
            for c in &cmds {
                match c {
                    Command::StartTimer { id, .. } => pending.push(*id),
                    Command::CancelTimer(id) => pending.retain(|p| p != id),
                    Command::Generate(req) => in_flight.push(req.turn_id),
                    Command::Publish(_) => {}
                }
            }
            assert!(in_flight.len() <= 1);
            assert!(engine.scheduler_state().round_count <= 20);
        }
        assert_eq!(engine.scheduler_state().round_count, 20);
        assert!(engine.scheduler_state().ceiling_reached);
    }
}
