use crate::anomaly::AnomalyClassifier;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::incidents::detect_incidents;
use crate::position_changes::detect_position_changes;
use crate::ranking::rank_segments;
use crate::raw::RawSession;
use crate::report::{self, AnalysisReport};
use crate::schema;
use crate::session::{Session, SessionKey};
use crate::store::SessionStore;
use crate::track_limits::detect_track_limits;
use std::thread::{self, ScopedJoinHandle};

/// Runs the whole pipeline for one session: validate, detect, rank, assemble.
#[derive(Debug, Clone)]
pub struct RaceAnalyzer {
    config: AnalysisConfig,
    classifier: AnomalyClassifier,
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

impl RaceAnalyzer {
    /// Fails with `ThresholdConfig` before any data is touched.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            classifier: AnomalyClassifier::new(config.thresholds),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Detection over an already validated session. The three detectors
    /// share the session read-only and run on their own threads.
    pub fn analyze(&self, session: &Session) -> AnalysisReport {
        let classifier = &self.classifier;
        let window = self.config.window_laps();

        let (incidents, position_changes, track_limits) = thread::scope(|s| {
            let incidents = s.spawn(|| detect_incidents(session, classifier, window));
            let changes = s.spawn(|| detect_position_changes(session, classifier));
            let track_limits = detect_track_limits(session, classifier);
            (join(incidents), join(changes), track_limits)
        });

        let segments = rank_segments(
            session,
            &incidents.items,
            &position_changes.items,
            &track_limits.items,
        );
        let report = report::assemble(
            session,
            self.config,
            incidents,
            position_changes,
            track_limits,
            segments,
        );
        for issue in &report.diagnostics.issues {
            tracing::warn!(detector = %issue.detector(), "{issue}");
        }
        tracing::info!(
            session = %session.key(),
            incidents = report.incidents.len(),
            position_changes = report.position_changes.len(),
            track_limits = report.track_limits_violations.len(),
            segments = report.commentary_segments.len(),
            issues = report.diagnostics.issues.len(),
            "analysis finished"
        );
        report
    }

    pub fn analyze_raw(&self, key: SessionKey, raw: &RawSession) -> Result<AnalysisReport, AnalysisError> {
        let session = schema::validate(key, raw)?;
        Ok(self.analyze(&session))
    }

    /// Load, validate and analyze. Load and schema failures abort with no
    /// partial report.
    pub fn run<S: SessionStore + ?Sized>(
        &self,
        store: &S,
        key: &SessionKey,
    ) -> Result<AnalysisReport, AnalysisError> {
        let raw = store.load(key)?;
        self.analyze_raw(key.clone(), &raw)
    }
}
