//! Session Runtime
//!
//! Drives a [`DiscussionEngine`] on tokio. Human input, timer expiries and
//! generation results are funnelled into one loop, handled one at a time, and
//! the resulting [`Command`]s are executed here: timers become sleeping tasks
//! tracked in a [`TimerSet`], generations become spawned provider calls, and
//! updates are forwarded to the session's observer. Forwarding never waits on
//! the observer, so a reader that is itself blocked on [`SessionHandle`] cannot
//! stall the loop.

use crate::{
    Command, GenerationRequest, TimerId,
    engine::{DiscussionEngine, SessionEvent, SessionInput, SessionUpdate},
    generator::ContentGenerator,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{Instrument, debug, info, warn};

/// Pending timers of one session. Every timer is aborted when the set is
/// cleared or dropped, so nothing fires after teardown.
#[derive(Default)]
pub struct TimerSet {
    handles: HashMap<TimerId, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `TimerFired(id)` on `tx` after `delay`.
    pub fn schedule(&mut self, id: TimerId, delay: Duration, tx: mpsc::Sender<SessionEvent>) {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SessionEvent::TimerFired(id)).await;
        });
        if let Some(old) = self.handles.insert(id, handle) {
            old.abort();
        }
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forgets a timer that has already fired.
    pub fn forget(&mut self, id: TimerId) {
        self.handles.remove(&id);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Sends human input into a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionHandle {
    /// Delivers `input`. Fails only if the session has already ended.
    pub async fn send(&self, input: SessionInput) -> anyhow::Result<()> {
        self.tx
            .send(input)
            .await
            .map_err(|_| anyhow::anyhow!("Session has ended"))
    }

    pub async fn type_text(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.send(SessionInput::Typed(text.into())).await
    }

    pub async fn submit(&self) -> anyhow::Result<()> {
        self.send(SessionInput::Submit).await
    }

    pub async fn finish(&self) -> anyhow::Result<()> {
        self.send(SessionInput::Finish).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owns one engine and executes its commands.
pub struct SessionRuntime {
    engine: DiscussionEngine,
    generator: Arc<dyn ContentGenerator>,
    inputs_rx: mpsc::Receiver<SessionInput>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    timers: TimerSet,
}

impl SessionRuntime {
    /// Spawns the session loop.
    ///
    /// # Returns
    /// A tuple containing:
    /// 1. A [`SessionHandle`] for human input.
    /// 2. A receiver of every [`SessionUpdate`] the engine publishes.
    /// 3. The `JoinHandle` of the loop, which resolves once the session finishes.
    pub fn spawn(
        engine: DiscussionEngine,
        generator: Arc<dyn ContentGenerator>,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionUpdate>,
        JoinHandle<()>,
    ) {
        let (inputs_tx, inputs_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let runtime = Self {
            engine,
            generator,
            inputs_rx,
            events_tx,
            events_rx,
            updates_tx,
            timers: TimerSet::new(),
        };
        let span = tracing::info_span!("discussion", topic = %runtime.engine.topic());
        let handle = tokio::spawn(runtime.run().instrument(span));
        (SessionHandle { tx: inputs_tx }, updates_rx, handle)
    }

    async fn run(mut self) {
        let commands = self.engine.start();
        self.execute(commands);

        while !self.engine.is_finished() {
            let event = tokio::select! {
                input = self.inputs_rx.recv() => match input {
                    Some(input) => SessionEvent::Input(input),
                    None => {
                        info!("All session handles dropped; finishing");
                        SessionEvent::Input(SessionInput::Finish)
                    }
                },
                Some(event) = self.events_rx.recv() => event,
            };

            if let SessionEvent::TimerFired(id) = &event {
                self.timers.forget(*id);
            }
            let commands = self.engine.handle(event, Instant::now());
            self.execute(commands);
        }

        self.timers.cancel_all();
        info!("Session loop finished");
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::StartTimer { id, delay } => {
                    self.timers.schedule(id, delay, self.events_tx.clone());
                }
                Command::CancelTimer(id) => {
                    self.timers.cancel(id);
                }
                Command::Generate(request) => self.spawn_generation(request),
                Command::Publish(update) => {
                    if self.updates_tx.send(update).is_err() {
                        debug!("Update receiver dropped");
                    }
                }
            }
        }
    }

    /// Runs one provider call in the background. The call is never aborted;
    /// if the session is gone by the time it resolves, the result is dropped.
    fn spawn_generation(&self, request: GenerationRequest) {
        let generator = self.generator.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(
            async move {
                let result = generator
                    .generate_reply(
                        &request.participant,
                        &request.topic,
                        &request.job_title,
                        &request.history,
                    )
                    .await;
                if let Err(e) = &result {
                    warn!(error = %e, "Generation call failed");
                }
                let event = SessionEvent::GenerationResolved {
                    turn_id: request.turn_id,
                    result,
                };
                if tx.send(event).await.is_err() {
                    debug!("Session ended before generation resolved; discarding");
                }
            }
            .in_current_span(),
        );
    }
}
