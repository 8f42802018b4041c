//! Progress-callback trait for extraction-run events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow a
//! run stage by stage. Callers forward events wherever they like (a spinner,
//! a log line, a job table) without the library knowing about it.
//!
//! # Example
//!
//! ```rust
//! use fin_extract::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(cb as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::RunSummary;
use crate::pipeline::Stage;
use std::sync::Arc;

/// Called by the orchestrator as the run advances.
///
/// All methods default to no-ops so implementations override only what they
/// need. Implementations must be `Send + Sync`: a shared callback may observe
/// several runs on different tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// A stage is about to run.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage finished without error.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// A financial record was dropped because its value could not be resolved.
    fn on_record_dropped(&self, metric_name: &str, column_label: &str) {
        let _ = (metric_name, column_label);
    }

    /// The run finished; `summary` is what the caller receives.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_record_dropped(&self, metric_name: &str, column_label: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("drop {metric_name}@{column_label}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::ReadDocument);
        cb.on_stage_complete(Stage::ReadDocument);
        cb.on_record_dropped("ebitda_margin", "Variance");
        cb.on_run_complete(&RunSummary::default());
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Normalize);
        rec.on_stage_complete(Stage::Normalize);
        rec.on_record_dropped("ebitda_margin", "Variance");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start normalize", "drop ebitda_margin@Variance"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::UpsertMetrics);
    }
}
