//! Session runner.
//!
//! A single task owns the [`SessionEngine`]. It consumes trainer events and
//! session commands, drives the one-second duration ticker while running, and
//! publishes a read-only [`SessionSnapshot`] after every change.

use crate::recording::session::SessionEngine;
use crate::recording::types::{
    ActivityPoint, RecorderError, SessionCommand, SessionSnapshot, SessionStatus, SessionSummary,
};
use crate::sensors::types::TrainerEvent;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};

/// Period of the duration ticker.
const TICK_PERIOD: Duration = Duration::from_secs(1);

type CommandRequest = (SessionCommand, oneshot::Sender<bool>);

/// What the runner hands back when it finishes.
#[derive(Debug, Clone, Default)]
pub struct RecordedSession {
    pub points: Vec<ActivityPoint>,
    pub summary: SessionSummary,
}

/// Control and observation handle for a running session task.
pub struct SessionHandle {
    commands: UnboundedSender<CommandRequest>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<RecordedSession>,
}

impl SessionHandle {
    /// Send a command and wait for whether it changed the session.
    pub async fn send(&self, command: SessionCommand) -> Result<bool, RecorderError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send((command, tx))
            .map_err(|_| RecorderError::RunnerStopped)?;
        rx.await.map_err(|_| RecorderError::RunnerStopped)
    }

    pub async fn start(&self) -> Result<bool, RecorderError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn pause(&self) -> Result<bool, RecorderError> {
        self.send(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<bool, RecorderError> {
        self.send(SessionCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<bool, RecorderError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn reset(&self) -> Result<bool, RecorderError> {
        self.send(SessionCommand::Reset).await
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Shut the runner down and collect the recorded points.
    ///
    /// A session still in progress is stopped first, so its pending second
    /// is kept.
    pub async fn finish(self) -> Result<RecordedSession, RecorderError> {
        let SessionHandle { commands, task, .. } = self;
        drop(commands);
        task.await
            .map_err(|e| RecorderError::TaskFailed(e.to_string()))
    }
}

/// Spawn a session runner stamping samples with wall-clock time.
pub fn spawn_session(events: UnboundedReceiver<TrainerEvent>) -> SessionHandle {
    spawn_session_with_clock(events, || chrono::Utc::now().timestamp_millis())
}

/// Spawn a session runner with a custom millisecond clock.
pub fn spawn_session_with_clock<C>(
    events: UnboundedReceiver<TrainerEvent>,
    clock: C,
) -> SessionHandle
where
    C: Fn() -> i64 + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

    let task = tokio::spawn(run_session(events, command_rx, snapshot_tx, clock));

    SessionHandle {
        commands: command_tx,
        snapshot: snapshot_rx,
        task,
    }
}

async fn run_session<C>(
    mut events: UnboundedReceiver<TrainerEvent>,
    mut commands: UnboundedReceiver<CommandRequest>,
    snapshot: watch::Sender<SessionSnapshot>,
    clock: C,
) -> RecordedSession
where
    C: Fn() -> i64,
{
    let mut engine = SessionEngine::new();
    let mut ticker: Option<Interval> = None;
    let mut events_open = true;

    loop {
        tokio::select! {
            request = commands.recv() => {
                let Some((command, reply)) = request else {
                    break;
                };
                let applied = apply(&mut engine, command);
                sync_ticker(&mut ticker, engine.status());
                let _ = reply.send(applied);
            }
            event = events.recv(), if events_open => match event {
                Some(TrainerEvent::Telemetry(sample)) => engine.add_telemetry(&sample, clock()),
                Some(TrainerEvent::Error(fault)) => tracing::warn!("Trainer fault: {}", fault),
                None => {
                    tracing::debug!("Trainer event channel closed");
                    events_open = false;
                }
            },
            _ = next_tick(&mut ticker) => engine.tick(),
        }

        publish(&snapshot, &engine);
    }

    if engine.status() != SessionStatus::NotStarted {
        engine.stop();
        publish(&snapshot, &engine);
    }

    let summary = engine.summary();
    RecordedSession {
        points: engine.take_points(),
        summary,
    }
}

fn apply(engine: &mut SessionEngine, command: SessionCommand) -> bool {
    tracing::debug!("Session command: {}", command);
    match command {
        SessionCommand::Start => engine.start(),
        SessionCommand::Pause => engine.pause(),
        SessionCommand::Resume => engine.resume(),
        SessionCommand::Stop => engine.stop(),
        SessionCommand::Reset => {
            engine.reset();
            true
        }
    }
}

/// The ticker exists exactly while the session is running.
fn sync_ticker(ticker: &mut Option<Interval>, status: SessionStatus) {
    match (status, ticker.is_some()) {
        (SessionStatus::Running, false) => {
            *ticker = Some(tokio::time::interval_at(
                Instant::now() + TICK_PERIOD,
                TICK_PERIOD,
            ));
        }
        (SessionStatus::Running, true) => {}
        (_, _) => *ticker = None,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn publish(snapshot: &watch::Sender<SessionSnapshot>, engine: &SessionEngine) {
    let current = SessionSnapshot {
        status: engine.status(),
        duration_ms: engine.duration_ms(),
        point_count: engine.points().len(),
        last_point: engine.points().last().copied(),
    };
    snapshot.send_if_modified(|published| {
        if *published == current {
            return false;
        }
        *published = current;
        true
    });
}
