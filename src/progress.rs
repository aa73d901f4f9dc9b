//! Progress tracking for long-running generation requests.
//!
//! Implements the observer pattern: the pipeline drives a [`ProgressTracker`]
//! through weighted steps, and the UI registers observers on a
//! [`ProgressReporter`] to receive percentage updates and log lines.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    RwLock,
};

use serde::{Deserialize, Serialize};

/// A single progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Current pipeline step
    pub step: String,
    /// Completion of the current step (0.0 - 100.0)
    pub step_progress: f32,
    /// Completion of the whole request (0.0 - 100.0)
    pub total_progress: f32,
    /// Optional log line for the UI
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(
        step: impl Into<String>,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Observer receiving progress updates.
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Dispatcher of progress updates to registered observers.
pub trait ProgressReporter: Send + Sync {
    /// Register an observer; returns an id usable with `remove_observer`.
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Remove an observer by id, returning it when found.
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Fan a progress update out to every observer.
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Default in-process reporter.
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut observers = self.observers.write().unwrap();
        observers.insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        let mut observers = self.observers.write().unwrap();
        observers.remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        let observers = self.observers.read().unwrap();
        for observer in observers.values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

/// Steps of the speech-generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    /// Rule-based text normalization
    TextNormalization,
    /// AI-assisted text refinement
    TextRefinement,
    /// Chunked speech synthesis
    SpeechGeneration,
    /// Background track mixing
    AudioMixing,
    /// Container encoding (WAV/MP3)
    Encoding,
}

impl ProcessStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextNormalization => "Chuẩn hóa văn bản",
            Self::TextRefinement => "Tinh chỉnh văn bản",
            Self::SpeechGeneration => "Tạo giọng nói",
            Self::AudioMixing => "Trộn nhạc nền",
            Self::Encoding => "Xuất âm thanh",
        }
    }

    /// Weight of the step as a share of the whole request.
    pub fn weight(&self) -> f32 {
        match self {
            Self::TextNormalization => 5.0,
            Self::TextRefinement => 10.0,
            Self::SpeechGeneration => 70.0,
            Self::AudioMixing => 10.0,
            Self::Encoding => 5.0,
        }
    }
}

/// Tracks pipeline progress across weighted steps and reports it.
pub struct ProgressTracker {
    reporter: Option<Box<dyn ProgressReporter>>,
    current_step: RwLock<ProcessStep>,
    step_progress: RwLock<f32>,
    total_progress: RwLock<f32>,
    completed_steps: RwLock<HashMap<ProcessStep, f32>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            reporter: None,
            current_step: RwLock::new(ProcessStep::TextNormalization),
            step_progress: RwLock::new(0.0),
            total_progress: RwLock::new(0.0),
            completed_steps: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let mut tracker = Self::new();
        tracker.reporter = Some(reporter);
        tracker
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.reporter = Some(reporter);
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        self.reporter
            .as_mut()
            .map(|reporter| reporter.add_observer(observer))
    }

    /// Switch to a new step. The previous step is considered 100% done.
    pub fn set_step(&self, step: ProcessStep) {
        let mut current_step = self.current_step.write().unwrap();
        if *current_step != step {
            let mut completed_steps = self.completed_steps.write().unwrap();
            completed_steps.insert(*current_step, 100.0);
            *current_step = step;
            drop(completed_steps);
            drop(current_step);

            let mut step_progress = self.step_progress.write().unwrap();
            *step_progress = 0.0;
            drop(step_progress);

            self.update_total_progress();
            self.report_progress(None);
        }
    }

    /// Update the completion of the current step (0.0 - 100.0).
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        let mut step_progress = self.step_progress.write().unwrap();
        *step_progress = progress.clamp(0.0, 100.0);
        drop(step_progress);

        self.update_total_progress();
        self.report_progress(details);
    }

    /// Emit a log line without changing progress state.
    pub fn notify(&self, details: impl Into<String>) {
        if let Some(reporter) = &self.reporter {
            let current_step = self.current_step.read().unwrap();
            let step_progress = self.step_progress.read().unwrap();
            let total_progress = self.total_progress.read().unwrap();

            reporter.notify_progress(ProgressInfo::new(
                current_step.as_str(),
                *step_progress,
                *total_progress,
                Some(details.into()),
            ));
        }
    }

    /// Mark the whole request complete.
    pub fn complete(&self) {
        let current_step = self.current_step.read().unwrap();
        let mut completed_steps = self.completed_steps.write().unwrap();
        completed_steps.insert(*current_step, 100.0);
        drop(completed_steps);
        drop(current_step);

        let mut total_progress = self.total_progress.write().unwrap();
        *total_progress = 100.0;
        drop(total_progress);

        self.report_progress(Some("Hoàn tất.".to_string()));
    }

    // Step weights sum to 100, so the accumulated share is already a
    // percentage and never regresses when a new step begins.
    fn update_total_progress(&self) {
        let mut total = 0.0;

        let completed_steps = self.completed_steps.read().unwrap();
        for (step, progress) in completed_steps.iter() {
            total += step.weight() * progress / 100.0;
        }
        drop(completed_steps);

        let current_step = self.current_step.read().unwrap();
        let step_progress = self.step_progress.read().unwrap();
        total += current_step.weight() * *step_progress / 100.0;

        let mut total_progress = self.total_progress.write().unwrap();
        *total_progress = total.clamp(0.0, 100.0);
    }

    fn report_progress(&self, details: Option<String>) {
        if let Some(reporter) = &self.reporter {
            let current_step = self.current_step.read().unwrap();
            let step_progress = self.step_progress.read().unwrap();
            let total_progress = self.total_progress.read().unwrap();

            reporter.notify_progress(ProgressInfo::new(
                current_step.as_str(),
                *step_progress,
                *total_progress,
                details,
            ));
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestObserver {
        updates: Arc<Mutex<Vec<ProgressInfo>>>,
    }

    impl TestObserver {
        fn new() -> (Self, Arc<Mutex<Vec<ProgressInfo>>>) {
            let updates = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    updates: updates.clone(),
                },
                updates,
            )
        }
    }

    impl ProgressObserver for TestObserver {
        fn on_progress_update(&self, progress: ProgressInfo) {
            self.updates.lock().unwrap().push(progress);
        }
    }

    #[test]
    fn test_progress_tracker() {
        let mut reporter = DefaultProgressReporter::new();
        let (observer, updates) = TestObserver::new();
        reporter.add_observer(Box::new(observer));

        let tracker = ProgressTracker::with_reporter(Box::new(reporter));

        tracker.update_step_progress(50.0, None);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].step, ProcessStep::TextNormalization.as_str());
            assert_eq!(updates[0].step_progress, 50.0);
            assert!(updates[0].total_progress > 0.0);
        }

        tracker.set_step(ProcessStep::SpeechGeneration);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 2);
            assert_eq!(updates[1].step, ProcessStep::SpeechGeneration.as_str());
            assert_eq!(updates[1].step_progress, 0.0);
        }

        tracker.complete();
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates[2].total_progress, 100.0);
        }
    }

    #[test]
    fn test_total_progress_is_monotonic_across_steps() {
        let mut reporter = DefaultProgressReporter::new();
        let (observer, updates) = TestObserver::new();
        reporter.add_observer(Box::new(observer));
        let tracker = ProgressTracker::with_reporter(Box::new(reporter));

        tracker.update_step_progress(100.0, None);
        tracker.set_step(ProcessStep::TextRefinement);
        tracker.update_step_progress(100.0, None);
        tracker.set_step(ProcessStep::SpeechGeneration);
        tracker.update_step_progress(50.0, None);

        let updates = updates.lock().unwrap();
        let totals: Vec<f32> = updates.iter().map(|u| u.total_progress).collect();
        for pair in totals.windows(2) {
            assert!(pair[1] >= pair[0] - 0.001, "totals regressed: {totals:?}");
        }
    }
}
