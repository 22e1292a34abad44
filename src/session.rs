//! Monitoring session: one tokio task drives source → pipeline → sink.
//!
//! Mode and enable changes arrive as [`SessionCommand`]s on a channel, so the pipeline
//! state is never touched from outside the task.

use crate::collectors::{SourceError, SourceEvent, TrafficSource};
use crate::model::InferenceStage;
use crate::pipeline::Pipeline;
use crate::sink::DecisionSink;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

const COMMAND_QUEUE: usize = 16;

pub enum SessionCommand {
    SetRealtime(bool),
    /// Replace (or enable) the inference stage, e.g. after fixed artifacts were supplied
    InstallInference(Box<InferenceStage>),
    DisableInference,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub samples: u64,
    pub foreign_packets: u64,
    pub malformed: u64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub transitions: u64,
    pub emitted: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("session task failed: {0}")]
    Task(String),
}

pub struct Session;

impl Session {
    /// Start the processing loop on the current runtime.
    pub fn spawn<S>(pipeline: Pipeline, source: TrafficSource, sink: S) -> SessionHandle
    where
        S: DecisionSink + 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let session_id = pipeline.session_id().to_string();
        let span = info_span!("session", id = %session_id, mode = source.mode());
        let task = tokio::spawn(run(pipeline, source, sink, rx).instrument(span));
        SessionHandle {
            session_id,
            commands: tx,
            task,
        }
    }
}

pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<Result<SessionStats, SessionError>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Sender for out-of-band control (signal handlers, other tasks).
    pub fn commands(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    /// `false` once the session has ended.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn set_realtime(&self, enabled: bool) -> bool {
        self.send(SessionCommand::SetRealtime(enabled)).await
    }

    pub async fn install_inference(&self, stage: InferenceStage) -> bool {
        self.send(SessionCommand::InstallInference(Box::new(stage))).await
    }

    pub async fn disable_inference(&self) -> bool {
        self.send(SessionCommand::DisableInference).await
    }

    pub async fn stop(&self) -> bool {
        self.send(SessionCommand::Stop).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end (stop command, exhausted source, or source failure).
    pub async fn join(self) -> Result<SessionStats, SessionError> {
        let SessionHandle { commands, task, .. } = self;
        let joined = task.await;
        drop(commands);
        joined.map_err(|e| SessionError::Task(e.to_string()))?
    }
}

async fn run<S: DecisionSink>(
    mut pipeline: Pipeline,
    mut source: TrafficSource,
    mut sink: S,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> Result<SessionStats, SessionError> {
    info!(
        inference = pipeline.inference_enabled(),
        realtime = pipeline.realtime(),
        "session started"
    );
    let mut commands_open = true;

    let outcome = loop {
        tokio::select! {
            biased;
            cmd = commands.recv(), if commands_open => match cmd {
                Some(SessionCommand::Stop) => break Ok(()),
                Some(SessionCommand::SetRealtime(on)) => pipeline.set_realtime(on),
                Some(SessionCommand::InstallInference(stage)) => pipeline.install_inference(*stage),
                Some(SessionCommand::DisableInference) => pipeline.disable_inference(),
                // handle dropped: keep running until the source ends
                None => commands_open = false,
            },
            next = source.next() => match next {
                Ok(Some(SourceEvent::Sample(sample))) => {
                    if let Some(event) = pipeline.on_sample(sample).await {
                        sink.deliver(&event);
                    }
                }
                Ok(Some(SourceEvent::Interval(interval))) => {
                    if let Some(event) = pipeline.on_interval(&interval).await {
                        sink.deliver(&event);
                    }
                }
                Ok(None) => {
                    info!("traffic source exhausted");
                    break Ok(());
                }
                Err(e) => break Err(e),
            },
        }
    };

    let p = pipeline.stats();
    let (malformed, foreign_packets) = source.drop_counts();
    let stats = SessionStats {
        samples: p.samples,
        foreign_packets,
        malformed,
        ticks: p.ticks,
        skipped_ticks: p.skipped_ticks,
        transitions: p.transitions,
        emitted: p.emitted,
    };
    match &outcome {
        Ok(()) => info!(?stats, "session stopped"),
        Err(e) => tracing::error!(error = %e, ?stats, "session aborted"),
    }
    outcome.map(|()| stats).map_err(SessionError::from)
}
