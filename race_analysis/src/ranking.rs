//! Merges the three detectors' outputs into one totally ordered list of
//! commentary segments.

use crate::model::{Incident, PositionChange, TrackLimitsViolation};
use crate::session::Session;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Incident,
    TrackLimits,
    PositionChange,
}

impl SegmentType {
    fn slug(self) -> &'static str {
        match self {
            SegmentType::Incident => "incident",
            SegmentType::TrackLimits => "track-limits",
            SegmentType::PositionChange => "position-change",
        }
    }

    fn list(self) -> &'static str {
        match self {
            SegmentType::Incident => "incidents",
            SegmentType::TrackLimits => "track_limits_violations",
            SegmentType::PositionChange => "position_changes",
        }
    }
}

/// Priority tiers; 1 ranks first.
pub const PRIORITY_COLLISION: u8 = 1;
pub const PRIORITY_INCIDENT: u8 = 2;
pub const PRIORITY_TRACK_LIMITS: u8 = 3;
pub const PRIORITY_POSITION_CHANGE: u8 = 4;

/// Points back at the entity inside the report's per-category list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub list: &'static str,
    pub index: usize,
}

/// What the visualizer needs to cut the lap out of the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisualReference {
    pub lap: u32,
    /// Approximate seconds since session start.
    pub start_s: Option<f64>,
    pub duration_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentarySegment {
    pub id: String,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub collision: bool,
    pub lap: u32,
    pub title: String,
    pub priority: u8,
    /// Within-tier magnitude: places moved, lap-time delta, or anomaly count.
    pub score: f64,
    pub drivers: Vec<String>,
    pub reference: EntityRef,
    pub visual: VisualReference,
}

impl CommentarySegment {
    fn primary_driver(&self) -> &str {
        self.drivers.first().map(String::as_str).unwrap_or("")
    }
}

/// Total order: tier, magnitude (descending), lap, primary driver, title,
/// then position in the source list.
fn rank_order(a: &CommentarySegment, b: &CommentarySegment) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.score.total_cmp(&a.score))
        .then(a.lap.cmp(&b.lap))
        .then_with(|| a.primary_driver().cmp(b.primary_driver()))
        .then_with(|| a.title.cmp(&b.title))
        .then(a.reference.index.cmp(&b.reference.index))
}

fn visual_reference(session: &Session, driver: Option<&str>, lap: u32) -> VisualReference {
    let mut visual = VisualReference {
        lap,
        start_s: None,
        duration_s: None,
    };
    let Some(driver) = driver else {
        return visual;
    };
    let frames = session.frames(driver, lap);
    if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
        visual.start_s = Some(first.timestamp);
        visual.duration_s = Some(last.timestamp - first.timestamp);
        return visual;
    }
    // Fall back to summed lap times; only exact when every earlier lap is timed.
    let laps = session.driver_laps(driver);
    let earlier: Option<f64> = laps
        .iter()
        .take_while(|l| l.lap_number < lap)
        .map(|l| l.lap_time)
        .sum();
    let contiguous = laps.first().map(|l| l.lap_number) == Some(1)
        && laps.iter().take_while(|l| l.lap_number < lap).count() as u32 == lap.saturating_sub(1);
    if contiguous {
        visual.start_s = earlier;
    }
    visual.duration_s = session.lap(driver, lap).and_then(|l| l.lap_time);
    visual
}

fn incident_title(incident: &Incident, lap: u32) -> String {
    let label = if incident.collision { "Collision" } else { "Incident" };
    if incident.drivers.is_empty() {
        format!("{label} - Lap {lap}")
    } else {
        format!("{label} - {} (Lap {lap})", incident.drivers.join(", "))
    }
}

fn violation_title(v: &TrackLimitsViolation, lap: u32) -> String {
    let who = v.driver.as_deref().unwrap_or("Unknown driver");
    match v.turn {
        Some(turn) => format!("Track Limits - {who} at Turn {turn} (Lap {lap})"),
        None => format!("Track Limits - {who} (Lap {lap})"),
    }
}

fn change_title(c: &PositionChange) -> String {
    format!(
        "{} {:+} positions, P{} to P{} (Lap {})",
        c.driver, c.delta, c.position_before, c.position_after, c.lap
    )
}

/// Builds and orders the segments. Entities without a lap cannot be placed
/// on the timeline and are left out.
pub fn rank_segments(
    session: &Session,
    incidents: &[Incident],
    position_changes: &[PositionChange],
    violations: &[TrackLimitsViolation],
) -> Vec<CommentarySegment> {
    let mut segments = Vec::new();

    for (index, incident) in incidents.iter().enumerate() {
        let Some(lap) = incident.lap else { continue };
        segments.push(CommentarySegment {
            id: String::new(),
            segment_type: SegmentType::Incident,
            collision: incident.collision,
            lap,
            title: incident_title(incident, lap),
            priority: if incident.collision {
                PRIORITY_COLLISION
            } else {
                PRIORITY_INCIDENT
            },
            score: incident.anomaly_count() as f64,
            drivers: incident.drivers.clone(),
            reference: EntityRef {
                list: SegmentType::Incident.list(),
                index,
            },
            visual: visual_reference(session, incident.drivers.first().map(String::as_str), lap),
        });
    }

    for (index, v) in violations.iter().enumerate() {
        let Some(lap) = v.lap else { continue };
        segments.push(CommentarySegment {
            id: String::new(),
            segment_type: SegmentType::TrackLimits,
            collision: false,
            lap,
            title: violation_title(v, lap),
            priority: PRIORITY_TRACK_LIMITS,
            score: v.lap_time_delta.map(f64::abs).unwrap_or(0.0),
            drivers: v.driver.iter().cloned().collect(),
            reference: EntityRef {
                list: SegmentType::TrackLimits.list(),
                index,
            },
            visual: visual_reference(session, v.driver.as_deref(), lap),
        });
    }

    for (index, c) in position_changes.iter().enumerate() {
        segments.push(CommentarySegment {
            id: String::new(),
            segment_type: SegmentType::PositionChange,
            collision: false,
            lap: c.lap,
            title: change_title(c),
            priority: PRIORITY_POSITION_CHANGE,
            score: c.delta.unsigned_abs() as f64,
            drivers: vec![c.driver.clone()],
            reference: EntityRef {
                list: SegmentType::PositionChange.list(),
                index,
            },
            visual: visual_reference(session, Some(&c.driver), c.lap),
        });
    }

    segments.sort_by(rank_order);
    assign_ids(&mut segments);
    segments
}

/// Ids derive from content; repeats get a numeric suffix in rank order.
fn assign_ids(segments: &mut [CommentarySegment]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for segment in segments.iter_mut() {
        let who = if segment.drivers.is_empty() {
            "none".to_string()
        } else {
            segment.drivers.join("-").to_ascii_lowercase()
        };
        let base = format!("{}-lap{}-{}", segment.segment_type.slug(), segment.lap, who);
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        segment.id = if *count == 1 {
            base
        } else {
            format!("{base}-{count}")
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{driver, frame, lap, session_from};
    use crate::model::{LapComparison, LapWindow};
    use crate::patterns::StewardAction;
    use crate::types::LapRecord;

    fn session() -> Session {
        session_from(
            vec![driver("VER", 1), driver("HAM", 44), driver("STR", 18)],
            (1..=20)
                .flat_map(|n| [lap("VER", n, 1), lap("HAM", n, 2), lap("STR", n, 3)])
                .collect(),
            vec![frame("HAM", 12, 1000.0, 250.0, 0.0, 7), frame("HAM", 12, 1081.5, 260.0, 0.0, 7)],
            vec![],
        )
    }

    fn incident(lap: u32, collision: bool, drivers: &[&str]) -> Incident {
        Incident {
            message_index: 0,
            lap: Some(lap),
            message: "INCIDENT".into(),
            collision,
            steward_action: StewardAction::Unknown,
            drivers: drivers.iter().map(|d| d.to_string()).collect(),
            window: Some(LapWindow::around(lap, 2, 20)),
            summaries: vec![],
            telemetry_available: false,
        }
    }

    fn violation(lap: u32, driver: &str, lap_time_delta: Option<f64>) -> TrackLimitsViolation {
        TrackLimitsViolation {
            message_index: 0,
            driver: Some(driver.into()),
            lap: Some(lap),
            turn: Some(4),
            message: "TRACK LIMITS AT TURN 4".into(),
            steward_action: StewardAction::LapTimeDeleted,
            deleted_lap_time: None,
            lap_time: None,
            lap_time_delta,
            speed_range: None,
            sectors: [None; 3],
            anomalies: vec![],
        }
    }

    fn change(driver: &str, lap: u32, before: u32, after: u32) -> PositionChange {
        let record = |position| LapRecord {
            driver: driver.into(),
            lap_number: lap,
            lap_time: None,
            sectors: [None; 3],
            speed_traps: Default::default(),
            position,
            compound: None,
            tire_life: None,
            pit_in: false,
            pit_out: false,
        };
        PositionChange {
            driver: driver.into(),
            lap,
            position_before: before,
            position_after: after,
            delta: i64::from(before) - i64::from(after),
            major: true,
            pit_stop: false,
            comparison: LapComparison::between(&record(before), &record(after)),
            anomalies: vec![],
        }
    }

    #[test]
    fn collision_ranks_first_regardless_of_input_order() {
        let session = session();
        let ranked = rank_segments(
            &session,
            &[incident(15, true, &["VER", "HAM"])],
            &[change("STR", 3, 8, 16)],
            &[violation(9, "HAM", Some(1.2))],
        );
        let types: Vec<SegmentType> = ranked.iter().map(|s| s.segment_type).collect();
        assert_eq!(
            types,
            vec![SegmentType::Incident, SegmentType::TrackLimits, SegmentType::PositionChange]
        );
        assert!(ranked[0].collision);
        assert_eq!(ranked[0].priority, PRIORITY_COLLISION);
        assert_eq!(ranked[0].title, "Collision - VER, HAM (Lap 15)");
        assert_eq!(ranked[2].title, "STR -8 positions, P8 to P16 (Lap 3)");
    }

    #[test]
    fn plain_incidents_rank_below_collisions() {
        let session = session();
        let ranked = rank_segments(
            &session,
            &[incident(2, false, &["VER"]), incident(18, true, &["HAM"])],
            &[],
            &[],
        );
        assert_eq!(ranked[0].lap, 18);
        assert_eq!(ranked[1].priority, PRIORITY_INCIDENT);
    }

    #[test]
    fn magnitude_then_lap_then_driver_break_ties() {
        let session = session();
        let changes = [
            change("VER", 10, 1, 6),
            change("STR", 4, 10, 20),
            change("HAM", 10, 2, 7),
            change("STR", 12, 3, 8),
        ];
        let ranked = rank_segments(&session, &[], &changes, &[]);
        let order: Vec<(&str, u32)> = ranked
            .iter()
            .map(|s| (s.drivers[0].as_str(), s.lap))
            .collect();
        assert_eq!(order, vec![("STR", 4), ("HAM", 10), ("VER", 10), ("STR", 12)]);
    }

    #[test]
    fn ordering_does_not_depend_on_input_order() {
        let session = session();
        let changes = vec![change("VER", 10, 1, 6), change("HAM", 10, 2, 7)];
        let violations = vec![violation(5, "VER", None), violation(5, "HAM", None)];
        let forward = rank_segments(&session, &[], &changes, &violations);

        let reversed_changes: Vec<_> = changes.iter().rev().cloned().collect();
        let reversed_violations: Vec<_> = violations.iter().rev().cloned().collect();
        let backward = rank_segments(&session, &[], &reversed_changes, &reversed_violations);

        let ids = |s: &[CommentarySegment]| s.iter().map(|x| x.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&forward), ids(&backward));
    }

    #[test]
    fn ids_are_content_derived_and_unique() {
        let session = session();
        let ranked = rank_segments(
            &session,
            &[incident(7, false, &["VER"]), incident(7, false, &["VER"])],
            &[],
            &[violation(9, "HAM", None)],
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["incident-lap7-ver", "incident-lap7-ver-2", "track-limits-lap9-ham"]);
    }

    #[test]
    fn unplaced_incidents_are_not_ranked() {
        let session = session();
        let mut unplaced = incident(3, true, &["VER"]);
        unplaced.lap = None;
        assert!(rank_segments(&session, &[unplaced], &[], &[]).is_empty());
    }

    #[test]
    fn visual_reference_prefers_frames_then_lap_times() {
        let session = session();
        let from_frames = visual_reference(&session, Some("HAM"), 12);
        assert_eq!(from_frames.start_s, Some(1000.0));
        assert_eq!(from_frames.duration_s, Some(81.5));

        let from_laps = visual_reference(&session, Some("VER"), 3);
        assert_eq!(from_laps.start_s, Some(160.0));
        assert_eq!(from_laps.duration_s, Some(80.0));

        let unknown = visual_reference(&session, None, 3);
        assert_eq!((unknown.start_s, unknown.duration_s), (None, None));
    }

    #[test]
    fn violation_without_lap_time_delta_scores_zero() {
        let session = session();
        let ranked = rank_segments(
            &session,
            &[],
            &[],
            &[violation(5, "VER", None), violation(6, "HAM", Some(-3.0))],
        );
        assert_eq!(ranked[0].score, 3.0);
        assert_eq!(ranked[0].drivers, vec!["HAM"]);
        assert_eq!(ranked[1].score, 0.0);
    }
}
