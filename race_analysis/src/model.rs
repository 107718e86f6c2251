//! Entities derived by the detectors. All of them are built once and never
//! mutated afterwards.

use crate::anomaly::AnomalyFlag;
use crate::error::DetectionIssue;
use crate::patterns::StewardAction;
use crate::types::{LapRecord, SpeedTrap, SpeedTraps, TelemetryFrame};
use serde::Serialize;

/// Brake pressure at or above this share of full travel counts as heavy braking.
pub const HEAVY_BRAKING_PCT: f64 = 80.0;

/// Output of one detector: the entities plus the non-fatal issues met on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection<T> {
    pub items: Vec<T>,
    pub issues: Vec<DetectionIssue>,
}

impl<T> Default for Detection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            issues: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LapWindow {
    pub first_lap: u32,
    pub last_lap: u32,
}

impl LapWindow {
    /// `W` laps either side of `lap`, clamped to `[1, last_lap]`.
    pub fn around(lap: u32, w: u32, last_lap: u32) -> Self {
        let first_lap = lap.saturating_sub(w).max(1);
        let last_lap = lap.saturating_add(w).min(last_lap).max(first_lap);
        Self {
            first_lap,
            last_lap,
        }
    }

    pub fn laps(&self) -> impl Iterator<Item = u32> {
        self.first_lap..=self.last_lap
    }
}

/// Min, max and population variance of a sample; `None` when empty.
pub fn spread(values: &[f64]) -> Option<(f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max, variance))
}

/// Aggregates over high-rate car telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarTelemetrySummary {
    pub samples: usize,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub avg_throttle: f64,
    pub avg_brake: f64,
    pub max_brake: f64,
    pub max_rpm: f64,
    pub gear_changes: usize,
    pub heavy_braking_samples: usize,
}

impl CarTelemetrySummary {
    /// Summarizes per-lap frame runs; gear changes are counted within each run.
    pub fn from_laps<'a>(laps: impl IntoIterator<Item = &'a [TelemetryFrame]>) -> Option<Self> {
        let mut samples = 0usize;
        let (mut speed_sum, mut throttle_sum, mut brake_sum) = (0.0, 0.0, 0.0);
        let (mut max_speed, mut max_brake, mut max_rpm) = (0.0f64, 0.0f64, 0.0f64);
        let mut gear_changes = 0usize;
        let mut heavy_braking_samples = 0usize;

        for frames in laps {
            gear_changes += frames.windows(2).filter(|w| w[0].gear != w[1].gear).count();
            for f in frames {
                samples += 1;
                speed_sum += f.speed;
                throttle_sum += f.throttle;
                brake_sum += f.brake;
                max_speed = max_speed.max(f.speed);
                max_brake = max_brake.max(f.brake);
                max_rpm = max_rpm.max(f.rpm);
                if f.brake >= HEAVY_BRAKING_PCT {
                    heavy_braking_samples += 1;
                }
            }
        }

        if samples == 0 {
            return None;
        }
        let n = samples as f64;
        Some(Self {
            samples,
            avg_speed: speed_sum / n,
            max_speed,
            avg_throttle: throttle_sum / n,
            avg_brake: brake_sum / n,
            max_brake,
            max_rpm,
            gear_changes,
            heavy_braking_samples,
        })
    }
}

/// Telemetry evidence for one driver across an incident window. Only built
/// when every lap of the window has frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowTelemetry {
    pub speed_min: Option<f64>,
    pub speed_max: Option<f64>,
    pub speed_variance: Option<f64>,
    pub car: CarTelemetrySummary,
}

/// One timed lap inside an incident window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowLap {
    pub lap: u32,
    pub lap_time: Option<f64>,
    pub sectors: [Option<f64>; 3],
    pub speed_traps: SpeedTraps,
    pub position: u32,
    pub compound: Option<String>,
    pub tire_life: Option<u32>,
    pub pit_in: bool,
    pub pit_out: bool,
}

impl From<&LapRecord> for WindowLap {
    fn from(l: &LapRecord) -> Self {
        Self {
            lap: l.lap_number,
            lap_time: l.lap_time,
            sectors: l.sectors,
            speed_traps: l.speed_traps,
            position: l.position,
            compound: l.compound.clone(),
            tire_life: l.tire_life,
            pit_in: l.pit_in,
            pit_out: l.pit_out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectorTime {
    pub lap: u32,
    pub time: f64,
}

/// Sector evidence across a window, built from timing alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectorSummary {
    /// Slowest time per sector; ties go to the earlier lap.
    pub slowest: [Option<SectorTime>; 3],
    pub incident_lap: [Option<f64>; 3],
    /// Compounds in order of first use.
    pub compounds_used: Vec<String>,
}

impl SectorSummary {
    pub fn over(laps: &[&LapRecord], incident_lap: u32) -> Self {
        let mut summary = Self::default();
        for l in laps {
            for (slot, time) in summary.slowest.iter_mut().zip(l.sectors) {
                let Some(time) = time else { continue };
                if slot.map_or(true, |s| time.total_cmp(&s.time).is_gt()) {
                    *slot = Some(SectorTime {
                        lap: l.lap_number,
                        time,
                    });
                }
            }
            if l.lap_number == incident_lap {
                summary.incident_lap = l.sectors;
            }
            if let Some(compound) = &l.compound {
                if !summary.compounds_used.contains(compound) {
                    summary.compounds_used.push(compound.clone());
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverWindowSummary {
    pub driver: String,
    pub position_before: Option<u32>,
    pub position_after: Option<u32>,
    pub compound: Option<String>,
    pub tire_life: Option<u32>,
    /// Lap-by-lap timing for every window lap the driver completed.
    pub laps: Vec<WindowLap>,
    pub sectors: SectorSummary,
    pub telemetry_available: bool,
    pub telemetry: Option<WindowTelemetry>,
    pub anomalies: Vec<AnomalyFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    /// Row of the originating race-control message.
    pub message_index: usize,
    pub lap: Option<u32>,
    pub message: String,
    pub collision: bool,
    pub steward_action: StewardAction,
    pub drivers: Vec<String>,
    pub window: Option<LapWindow>,
    pub summaries: Vec<DriverWindowSummary>,
    pub telemetry_available: bool,
}

impl Incident {
    pub fn anomaly_count(&self) -> usize {
        self.summaries.iter().map(|s| s.anomalies.len()).sum()
    }
}

/// Lap-over-lap differences (`current - previous`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapComparison {
    pub lap_time_delta: Option<f64>,
    pub sector_deltas: [Option<f64>; 3],
    pub speed_deltas: SpeedTraps,
    pub compound_before: Option<String>,
    pub compound_after: Option<String>,
    pub compound_changed: bool,
    pub tire_life_delta: Option<i64>,
}

fn diff(prev: Option<f64>, curr: Option<f64>) -> Option<f64> {
    Some(curr? - prev?)
}

impl LapComparison {
    pub fn between(prev: &LapRecord, curr: &LapRecord) -> Self {
        let mut speed_deltas = SpeedTraps::default();
        for trap in SpeedTrap::ALL {
            speed_deltas.set(
                trap,
                diff(prev.speed_traps.get(trap), curr.speed_traps.get(trap)),
            );
        }
        let compound_changed = match (&prev.compound, &curr.compound) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        };
        Self {
            lap_time_delta: diff(prev.lap_time, curr.lap_time),
            sector_deltas: [
                diff(prev.sectors[0], curr.sectors[0]),
                diff(prev.sectors[1], curr.sectors[1]),
                diff(prev.sectors[2], curr.sectors[2]),
            ],
            speed_deltas,
            compound_before: prev.compound.clone(),
            compound_after: curr.compound.clone(),
            compound_changed,
            tire_life_delta: match (prev.tire_life, curr.tire_life) {
                (Some(a), Some(b)) => Some(i64::from(b) - i64::from(a)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionChange {
    pub driver: String,
    pub lap: u32,
    pub position_before: u32,
    pub position_after: u32,
    /// Positions gained; negative when positions were lost.
    pub delta: i64,
    /// Moved at least [`DEFAULT_MIN_POSITION_CHANGE`] places, whatever the
    /// configured detection threshold.
    ///
    /// [`DEFAULT_MIN_POSITION_CHANGE`]: crate::config::DEFAULT_MIN_POSITION_CHANGE
    pub major: bool,
    /// The pair spans a pit entry or exit.
    pub pit_stop: bool,
    pub comparison: LapComparison,
    pub anomalies: Vec<AnomalyFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackLimitsViolation {
    pub message_index: usize,
    pub driver: Option<String>,
    pub lap: Option<u32>,
    pub turn: Option<u32>,
    pub message: String,
    pub steward_action: StewardAction,
    pub deleted_lap_time: Option<f64>,
    pub lap_time: Option<f64>,
    /// Violation lap time minus the previous lap's.
    pub lap_time_delta: Option<f64>,
    pub speed_range: Option<SpeedRange>,
    pub sectors: [Option<f64>; 3],
    pub anomalies: Vec<AnomalyFlag>,
}
