//! Pipeline stage reporting
//!
//! Stage transitions are pushed through a `ProgressReporter` so front ends can
//! render incremental state without the pipeline knowing about them.

use instant::Instant;

/// Stages of the analysis state machine
///
/// Transitions are strictly sequential: Loading → Preprocessing →
/// ExtractingFeatures → Segmenting → Completed, with Failed reachable from
/// Loading and Preprocessing. Downstream stages never run after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// No request in flight
    Idle,
    /// Reading and decoding the input file
    Loading,
    /// Stretching onto the canonical canvas
    Preprocessing,
    /// Computing histogram and deep embedding
    ExtractingFeatures,
    /// Running segmentation and compositing the overlay
    Segmenting,
    /// Analysis finished
    Completed,
    /// Analysis halted with an error
    Failed,
}

impl AnalysisStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            AnalysisStage::Idle => "Idle",
            AnalysisStage::Loading => "Loading input image",
            AnalysisStage::Preprocessing => "Preprocessing to canonical canvas",
            AnalysisStage::ExtractingFeatures => "Extracting features",
            AnalysisStage::Segmenting => "Segmenting image",
            AnalysisStage::Completed => "Analysis completed",
            AnalysisStage::Failed => "Analysis failed",
        }
    }

    /// Typical progress percentage at this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            AnalysisStage::Idle => 0,
            AnalysisStage::Loading => 10,
            AnalysisStage::Preprocessing => 25,
            AnalysisStage::ExtractingFeatures => 60,
            AnalysisStage::Segmenting => 90,
            AnalysisStage::Completed | AnalysisStage::Failed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current stage
    pub stage: AnalysisStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a progress update for a stage
    #[must_use]
    pub fn new(stage: AnalysisStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for receiving pipeline progress
pub trait ProgressReporter: Send {
    /// Receive a stage transition
    fn report(&mut self, update: &ProgressUpdate);
}

/// Reporter that logs transitions at debug level
#[derive(Debug, Default)]
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn report(&mut self, update: &ProgressUpdate) {
        log::debug!(
            "[{:>3}%] {} ({} ms elapsed)",
            update.progress,
            update.description,
            update.elapsed_ms
        );
    }
}

/// Reporter that ignores every update
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&mut self, _update: &ProgressUpdate) {}
}

/// Tracks a run's start time and forwards stage transitions
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current: AnalysisStage,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current)
            .finish()
    }
}

impl ProgressTracker {
    /// Create a tracker over a reporter; the clock starts now
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current: AnalysisStage::Idle,
        }
    }

    /// Enter a stage and notify the reporter
    pub fn enter_stage(&mut self, stage: AnalysisStage) {
        self.current = stage;
        let update = ProgressUpdate::new(stage, self.start_time);
        self.reporter.report(&update);
    }

    /// The stage the tracker is currently in
    #[must_use]
    pub fn current_stage(&self) -> AnalysisStage {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingReporter {
        stages: Arc<Mutex<Vec<AnalysisStage>>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&mut self, update: &ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }
    }

    #[test]
    fn test_tracker_forwards_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let reporter = RecordingReporter {
            stages: Arc::clone(&stages),
        };
        let mut tracker = ProgressTracker::new(Box::new(reporter));

        tracker.enter_stage(AnalysisStage::Loading);
        tracker.enter_stage(AnalysisStage::Preprocessing);
        tracker.enter_stage(AnalysisStage::Completed);

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                AnalysisStage::Loading,
                AnalysisStage::Preprocessing,
                AnalysisStage::Completed
            ]
        );
        assert_eq!(tracker.current_stage(), AnalysisStage::Completed);
    }

    #[test]
    fn test_progress_is_monotonic_through_the_happy_path() {
        let ordered = [
            AnalysisStage::Idle,
            AnalysisStage::Loading,
            AnalysisStage::Preprocessing,
            AnalysisStage::ExtractingFeatures,
            AnalysisStage::Segmenting,
            AnalysisStage::Completed,
        ];
        let percentages: Vec<u8> = ordered.iter().map(AnalysisStage::progress_percentage).collect();
        assert!(percentages.windows(2).all(|w| w[0] < w[1] || w[1] == 100));
    }
}
