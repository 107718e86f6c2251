use crate::config::AnomalyThresholds;
use crate::types::SpeedTrap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Position,
    Speed,
    LapTime,
    Sector,
}

/// A concrete metric; its category picks the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Position,
    Speed(SpeedTrap),
    LapTime,
    /// Sector number, 1 through 3.
    Sector(u8),
}

impl Metric {
    pub fn category(self) -> MetricCategory {
        match self {
            Metric::Position => MetricCategory::Position,
            Metric::Speed(_) => MetricCategory::Speed,
            Metric::LapTime => MetricCategory::LapTime,
            Metric::Sector(_) => MetricCategory::Sector,
        }
    }

    pub fn name(self) -> String {
        match self {
            Metric::Position => "position".to_string(),
            Metric::Speed(trap) => format!("speed_{}", trap.label()),
            Metric::LapTime => "lap_time".to_string(),
            Metric::Sector(n) => format!("sector{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFlag {
    pub category: MetricCategory,
    pub metric: String,
    /// Lap the delta was measured on.
    pub lap: u32,
    pub delta: f64,
    pub threshold: f64,
}

/// Stateless rule evaluator. A delta is anomalous when its absolute value
/// meets or exceeds the threshold of its metric category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyClassifier {
    thresholds: AnomalyThresholds,
}

impl AnomalyClassifier {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    pub fn threshold(&self, category: MetricCategory) -> f64 {
        match category {
            MetricCategory::Position => self.thresholds.min_position_change as f64,
            MetricCategory::Speed => self.thresholds.speed_anomaly_kph,
            MetricCategory::LapTime => self.thresholds.lap_time_anomaly_s,
            MetricCategory::Sector => self.thresholds.sector_anomaly_s,
        }
    }

    pub fn is_anomalous(&self, metric: Metric, delta: f64) -> bool {
        delta.is_finite() && delta.abs() >= self.threshold(metric.category())
    }

    pub fn classify(&self, metric: Metric, lap: u32, delta: f64) -> Option<AnomalyFlag> {
        self.is_anomalous(metric, delta).then(|| AnomalyFlag {
            category: metric.category(),
            metric: metric.name(),
            lap,
            delta,
            threshold: self.threshold(metric.category()),
        })
    }
}
