use crate::error::{AnalysisError, ThresholdConfigError};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_MIN_POSITION_CHANGE: i64 = 5;
pub const DEFAULT_SPEED_ANOMALY_KPH: f64 = 15.0;
pub const DEFAULT_LAP_TIME_ANOMALY_S: f64 = 2.0;
pub const DEFAULT_SECTOR_ANOMALY_S: f64 = 0.5;
pub const DEFAULT_INCIDENT_WINDOW_LAPS: i64 = 2;
pub const MAX_INCIDENT_WINDOW_LAPS: i64 = 10;

/// Per-metric limits shared by every detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub min_position_change: i64,
    pub speed_anomaly_kph: f64,
    pub lap_time_anomaly_s: f64,
    pub sector_anomaly_s: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            min_position_change: DEFAULT_MIN_POSITION_CHANGE,
            speed_anomaly_kph: DEFAULT_SPEED_ANOMALY_KPH,
            lap_time_anomaly_s: DEFAULT_LAP_TIME_ANOMALY_S,
            sector_anomaly_s: DEFAULT_SECTOR_ANOMALY_S,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub thresholds: AnomalyThresholds,
    /// Laps either side of an incident lap (`W`).
    pub incident_window_laps: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: AnomalyThresholds::default(),
            incident_window_laps: DEFAULT_INCIDENT_WINDOW_LAPS,
        }
    }
}

/// Caller-supplied overrides; unset fields keep the configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub min_position_change: Option<i64>,
    pub speed_anomaly_kph: Option<f64>,
    pub lap_time_anomaly_s: Option<f64>,
    pub sector_anomaly_s: Option<f64>,
    pub incident_window_laps: Option<i64>,
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|err| AnalysisError::Io {
            path: path.to_path_buf(),
            err,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|err| AnalysisError::Decode {
            path: path.to_path_buf(),
            err,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &ThresholdOverrides) -> Self {
        let t = &mut self.thresholds;
        if let Some(v) = overrides.min_position_change {
            t.min_position_change = v;
        }
        if let Some(v) = overrides.speed_anomaly_kph {
            t.speed_anomaly_kph = v;
        }
        if let Some(v) = overrides.lap_time_anomaly_s {
            t.lap_time_anomaly_s = v;
        }
        if let Some(v) = overrides.sector_anomaly_s {
            t.sector_anomaly_s = v;
        }
        if let Some(v) = overrides.incident_window_laps {
            self.incident_window_laps = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ThresholdConfigError> {
        let t = &self.thresholds;
        if t.min_position_change < 1 {
            return Err(ThresholdConfigError {
                field: "min_position_change",
                value: t.min_position_change.to_string(),
                reason: "must be at least 1",
            });
        }
        for (field, value) in [
            ("speed_anomaly_kph", t.speed_anomaly_kph),
            ("lap_time_anomaly_s", t.lap_time_anomaly_s),
            ("sector_anomaly_s", t.sector_anomaly_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ThresholdConfigError {
                    field,
                    value: value.to_string(),
                    reason: "must be a finite, non-negative number",
                });
            }
        }
        if !(0..=MAX_INCIDENT_WINDOW_LAPS).contains(&self.incident_window_laps) {
            return Err(ThresholdConfigError {
                field: "incident_window_laps",
                value: self.incident_window_laps.to_string(),
                reason: "must be between 0 and 10",
            });
        }
        Ok(())
    }

    /// Window size as a lap count; only meaningful after [`Self::validate`].
    pub fn window_laps(&self) -> u32 {
        u32::try_from(self.incident_window_laps.clamp(0, MAX_INCIDENT_WINDOW_LAPS)).unwrap_or(0)
    }
}
