//! Background analysis worker
//!
//! Runs the blocking analysis pipeline off the async runtime and streams
//! generation-tagged events back over a channel. Every submission gets a
//! monotonically increasing generation; submitting a new image cancels the
//! in-flight run at its next stage boundary and skips any queued requests, so
//! consumers only ever render results for the newest request. Stale events
//! are filtered by comparing generations, never by timing.

use crate::{
    error::{PixelscopeError, Result},
    pipeline::{AnalysisPipeline, AnalysisReport},
    progress::{ProgressReporter, ProgressUpdate},
};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "onnx")]
use crate::config::AnalysisConfig;

/// Event emitted by the worker, tagged with the generation that produced it
#[derive(Debug)]
pub enum AnalysisEvent {
    /// Stage transition inside a run
    Progress {
        /// Generation of the run that produced this update
        generation: u64,
        /// The stage transition
        update: ProgressUpdate,
    },
    /// A run finished successfully
    Completed {
        /// Generation of the finished run
        generation: u64,
        /// The full analysis result
        report: Box<AnalysisReport>,
    },
    /// A run halted with an error
    Failed {
        /// Generation of the failed run
        generation: u64,
        /// Display form of the error
        message: String,
    },
    /// A run was abandoned because a newer submission arrived
    Superseded {
        /// Generation of the abandoned run
        generation: u64,
    },
}

impl AnalysisEvent {
    /// Generation of the run this event belongs to
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            AnalysisEvent::Progress { generation, .. }
            | AnalysisEvent::Completed { generation, .. }
            | AnalysisEvent::Failed { generation, .. }
            | AnalysisEvent::Superseded { generation } => *generation,
        }
    }
}

struct Command {
    generation: u64,
    path: PathBuf,
    token: CancellationToken,
}

/// Forwards pipeline stage transitions into the worker's event channel
struct ForwardingReporter {
    generation: u64,
    events: mpsc::UnboundedSender<AnalysisEvent>,
}

impl ProgressReporter for ForwardingReporter {
    fn report(&mut self, update: &ProgressUpdate) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.events.send(AnalysisEvent::Progress {
            generation: self.generation,
            update: update.clone(),
        });
    }
}

/// Handle to a background analysis worker
///
/// Dropping the handle closes the command channel; the worker finishes its
/// current run and exits.
pub struct AnalysisWorker {
    commands: mpsc::UnboundedSender<Command>,
    next_generation: AtomicU64,
    active_token: Mutex<CancellationToken>,
    join: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for AnalysisWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisWorker")
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl AnalysisWorker {
    /// Spawn a worker over the default ONNX Runtime backend
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `ModelUnavailable` when configured weights cannot be resolved
    #[cfg(feature = "onnx")]
    pub fn spawn(
        config: AnalysisConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AnalysisEvent>)> {
        let pipeline = AnalysisPipeline::new(config)?;
        Ok(Self::spawn_with_pipeline(pipeline))
    }

    /// Spawn a worker over a pre-built pipeline
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_with_pipeline(
        pipeline: AnalysisPipeline,
    ) -> (Self, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let join = tokio::task::spawn_blocking(move || run_loop(pipeline, command_rx, &event_tx));

        let worker = Self {
            commands: command_tx,
            next_generation: AtomicU64::new(0),
            active_token: Mutex::new(CancellationToken::new()),
            join,
        };
        (worker, event_rx)
    }

    /// Submit an image for analysis, superseding any in-flight run
    ///
    /// Returns the generation assigned to this submission; events carrying an
    /// older generation should be ignored by the consumer.
    ///
    /// # Errors
    /// - `Processing` when the worker has already stopped
    pub fn submit<P: Into<PathBuf>>(&self, path: P) -> Result<u64> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        {
            let mut active = self
                .active_token
                .lock()
                .map_err(|_| PixelscopeError::processing("worker token lock poisoned"))?;
            active.cancel();
            *active = token.clone();
        }

        let command = Command {
            generation,
            path: path.into(),
            token,
        };
        self.commands
            .send(command)
            .map_err(|_| PixelscopeError::processing("analysis worker is not running"))?;
        debug!("Submitted analysis request, generation {generation}");
        Ok(generation)
    }

    /// Generation of the most recent submission
    #[must_use]
    pub fn latest_generation(&self) -> u64 {
        self.next_generation.load(Ordering::SeqCst)
    }

    /// Close the command channel and wait for the worker to exit
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.join.await {
            warn!("Analysis worker task did not shut down cleanly: {e}");
        }
    }
}

fn run_loop(
    mut pipeline: AnalysisPipeline,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<AnalysisEvent>,
) {
    info!("Analysis worker started");
    while let Some(mut command) = commands.blocking_recv() {
        // Collapse the queue: only the newest pending request is worth running.
        while let Ok(newer) = commands.try_recv() {
            let _ = events.send(AnalysisEvent::Superseded {
                generation: command.generation,
            });
            command = newer;
        }

        let generation = command.generation;
        pipeline.set_progress_reporter(Box::new(ForwardingReporter {
            generation,
            events: events.clone(),
        }));

        let event = match pipeline.analyze_file_with_token(&command.path, &command.token) {
            Ok(report) => AnalysisEvent::Completed {
                generation,
                report: Box::new(report),
            },
            Err(e) if e.is_cancelled() => AnalysisEvent::Superseded { generation },
            Err(e) => AnalysisEvent::Failed {
                generation,
                message: e.to_string(),
            },
        };
        if events.send(event).is_err() {
            break;
        }
    }
    info!("Analysis worker stopped");
}
