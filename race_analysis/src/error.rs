use serde::Serialize;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Errors that abort an analysis run before any detection happens.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no session data for race `{race}` session `{session}`")]
    DataNotFound { race: String, session: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    ThresholdConfig(#[from] ThresholdConfigError),
    #[error("failed to read {path}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to decode {path}: {err}")]
    Decode {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },
}

/// A required table or field is missing or outside its value domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SchemaError {
    pub table: &'static str,
    /// Zero-based row index; `None` for table-level problems.
    pub row: Option<usize>,
    pub field: &'static str,
    pub problem: String,
}

impl SchemaError {
    pub fn new(
        table: &'static str,
        row: Option<usize>,
        field: &'static str,
        problem: impl Into<String>,
    ) -> Self {
        Self {
            table,
            row,
            field,
            problem: problem.into(),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(
                f,
                "schema error in table `{}` row {}: field `{}` {}",
                self.table, row, self.field, self.problem
            ),
            None => write!(
                f,
                "schema error in table `{}`: field `{}` {}",
                self.table, self.field, self.problem
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid threshold `{field}` = {value}: {reason}")]
pub struct ThresholdConfigError {
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Which detector raised a non-fatal issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    Incidents,
    PositionChanges,
    TrackLimits,
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Detector::Incidents => "incidents",
            Detector::PositionChanges => "position_changes",
            Detector::TrackLimits => "track_limits",
        })
    }
}

/// Per-entity problems found during detection. These never abort a run;
/// they end up in the report's diagnostics block.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionIssue {
    #[error("{detector}: no telemetry for {driver} on laps {missing_laps:?}")]
    TelemetryUnavailable {
        detector: Detector,
        driver: String,
        missing_laps: Vec<u32>,
    },
    #[error("{detector}: could not parse {field} from `{message}`")]
    Parse {
        detector: Detector,
        field: &'static str,
        lap: Option<u32>,
        message: String,
    },
    #[error("{detector}: message `{message}` carries no lap number")]
    Unplaced { detector: Detector, message: String },
}

impl DetectionIssue {
    pub fn detector(&self) -> Detector {
        match self {
            DetectionIssue::TelemetryUnavailable { detector, .. }
            | DetectionIssue::Parse { detector, .. }
            | DetectionIssue::Unplaced { detector, .. } => *detector,
        }
    }
}
