//! Race session analysis: turns one session's lap, telemetry and
//! race-control tables into ranked commentary segments backed by
//! before/after evidence.

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod incidents;
pub mod model;
pub mod overview;
pub mod patterns;
pub mod position_changes;
pub mod ranking;
pub mod raw;
pub mod report;
pub mod schema;
pub mod session;
pub mod store;
pub mod track_limits;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use anomaly::{AnomalyClassifier, AnomalyFlag, Metric, MetricCategory};
pub use config::{AnalysisConfig, AnomalyThresholds, ThresholdOverrides};
pub use engine::RaceAnalyzer;
pub use error::{AnalysisError, DetectionIssue, Detector, SchemaError, ThresholdConfigError};
pub use model::{Detection, Incident, PositionChange, TrackLimitsViolation};
pub use ranking::{CommentarySegment, SegmentType};
pub use raw::RawSession;
pub use report::{render_summary, AnalysisReport};
pub use session::{Session, SessionKey};
pub use store::{CachedStore, JsonDirStore, SessionStore};
