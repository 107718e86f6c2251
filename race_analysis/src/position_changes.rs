use crate::anomaly::{AnomalyClassifier, AnomalyFlag, Metric};
use crate::config::DEFAULT_MIN_POSITION_CHANGE;
use crate::model::{Detection, LapComparison, PositionChange};
use crate::session::Session;
use crate::types::{LapRecord, SpeedTrap};
use serde::Serialize;

/// Consecutive lap pairs of one driver. Gaps in the lap sequence break the
/// chain: no pair is produced across a missing lap.
fn consecutive_pairs(laps: &[LapRecord]) -> impl Iterator<Item = (&LapRecord, &LapRecord)> {
    laps.windows(2)
        .map(|w| (&w[0], &w[1]))
        .filter(|(prev, curr)| prev.lap_number.checked_add(1) == Some(curr.lap_number))
}

/// Positions gained from `prev` to `curr`; negative when positions were lost.
fn gained(prev: &LapRecord, curr: &LapRecord) -> i64 {
    i64::from(prev.position) - i64::from(curr.position)
}

/// Every lap-over-lap move of at least `min_position_change` places, with
/// the lap comparison that goes with it.
pub fn detect_position_changes(
    session: &Session,
    classifier: &AnomalyClassifier,
) -> Detection<PositionChange> {
    let mut out = Detection::default();
    for (_, laps) in session.laps_by_driver() {
        for (prev, curr) in consecutive_pairs(laps) {
            let delta = gained(prev, curr);
            let Some(position_flag) = classifier.classify(Metric::Position, curr.lap_number, delta as f64)
            else {
                continue;
            };
            let comparison = LapComparison::between(prev, curr);
            let mut anomalies = vec![position_flag];
            anomalies.extend(comparison_anomalies(classifier, curr.lap_number, &comparison));
            out.items.push(PositionChange {
                driver: curr.driver.clone(),
                lap: curr.lap_number,
                position_before: prev.position,
                position_after: curr.position,
                delta,
                major: delta.abs() >= DEFAULT_MIN_POSITION_CHANGE,
                pit_stop: prev.pit_in || curr.pit_in || curr.pit_out,
                comparison,
                anomalies,
            });
        }
    }
    out.items.sort_by(|a, b| {
        b.delta
            .abs()
            .cmp(&a.delta.abs())
            .then(a.lap.cmp(&b.lap))
            .then_with(|| a.driver.cmp(&b.driver))
    });
    tracing::debug!(changes = out.items.len(), "position change analysis finished");
    out
}

/// Flags for lap time, sector and speed-trap deltas of a comparison.
pub(crate) fn comparison_anomalies(
    classifier: &AnomalyClassifier,
    lap: u32,
    comparison: &LapComparison,
) -> Vec<AnomalyFlag> {
    let mut flags = Vec::new();
    if let Some(delta) = comparison.lap_time_delta {
        flags.extend(classifier.classify(Metric::LapTime, lap, delta));
    }
    for (i, delta) in comparison.sector_deltas.iter().enumerate() {
        if let Some(delta) = delta {
            flags.extend(classifier.classify(Metric::Sector(i as u8 + 1), lap, *delta));
        }
    }
    for trap in SpeedTrap::ALL {
        if let Some(delta) = comparison.speed_deltas.get(trap) {
            flags.extend(classifier.classify(Metric::Speed(trap), lap, delta));
        }
    }
    flags
}

/// Counts of every non-zero lap-over-lap position move in the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PositionChangeTally {
    pub total: usize,
    pub three_plus: usize,
    pub five_plus: usize,
}

pub fn tally(session: &Session) -> PositionChangeTally {
    let mut tally = PositionChangeTally::default();
    for (_, laps) in session.laps_by_driver() {
        for (prev, curr) in consecutive_pairs(laps) {
            let moved = gained(prev, curr).abs();
            if moved > 0 {
                tally.total += 1;
            }
            if moved >= 3 {
                tally.three_plus += 1;
            }
            if moved >= 5 {
                tally.five_plus += 1;
            }
        }
    }
    tally
}
