//! Incident detection: race-control incident messages correlated with lap
//! windows of timing and telemetry for every driver they name.

use crate::anomaly::{AnomalyClassifier, AnomalyFlag, Metric};
use crate::error::{DetectionIssue, Detector};
use crate::model::{
    spread, CarTelemetrySummary, Detection, DriverWindowSummary, Incident, LapWindow,
    SectorSummary, WindowLap, WindowTelemetry,
};
use crate::patterns::{self, StewardAction};
use crate::session::Session;
use crate::types::{LapRecord, MessageCategory, RaceControlMessage, SpeedTrap};

/// Trap used for the window speed profile and speed-drop checks.
const WINDOW_TRAP: SpeedTrap = SpeedTrap::FinishLine;

fn qualifies(msg: &RaceControlMessage) -> bool {
    msg.category == MessageCategory::Incident || patterns::mentions_incident(&msg.message)
}

/// Drivers named in the text, falling back to the row's racing number.
pub(crate) fn message_drivers(session: &Session, msg: &RaceControlMessage) -> Vec<String> {
    let drivers = patterns::resolve_drivers(&msg.message, session.roster());
    if !drivers.is_empty() {
        return drivers;
    }
    msg.racing_number
        .and_then(|n| session.roster().code_for_number(n))
        .map(|code| vec![code.to_string()])
        .unwrap_or_default()
}

/// One [`Incident`] per qualifying message, however many drivers it names.
pub fn detect_incidents(
    session: &Session,
    classifier: &AnomalyClassifier,
    window_laps: u32,
) -> Detection<Incident> {
    let mut out = Detection::default();
    let last_lap = session.last_lap();

    for (message_index, msg) in session.race_control().iter().enumerate() {
        if !qualifies(msg) {
            continue;
        }
        let drivers = message_drivers(session, msg);
        if drivers.is_empty() {
            out.issues.push(DetectionIssue::Parse {
                detector: Detector::Incidents,
                field: "drivers",
                lap: msg.lap,
                message: msg.message.clone(),
            });
        }

        let window = msg.lap.map(|lap| LapWindow::around(lap, window_laps, last_lap));
        let summaries: Vec<DriverWindowSummary> = match (msg.lap, window) {
            (Some(lap), Some(window)) => drivers
                .iter()
                .map(|driver| summarize_driver(session, classifier, driver, lap, window, &mut out.issues))
                .collect(),
            _ => {
                out.issues.push(DetectionIssue::Unplaced {
                    detector: Detector::Incidents,
                    message: msg.message.clone(),
                });
                Vec::new()
            }
        };
        let telemetry_available =
            !summaries.is_empty() && summaries.iter().all(|s| s.telemetry_available);

        out.items.push(Incident {
            message_index,
            lap: msg.lap,
            message: msg.message.clone(),
            collision: patterns::mentions_collision(&msg.message),
            steward_action: StewardAction::parse(&msg.message),
            drivers,
            window,
            summaries,
            telemetry_available,
        });
    }

    tracing::debug!(
        incidents = out.items.len(),
        issues = out.issues.len(),
        "incident detection finished"
    );
    out
}

fn summarize_driver(
    session: &Session,
    classifier: &AnomalyClassifier,
    driver: &str,
    lap: u32,
    window: LapWindow,
    issues: &mut Vec<DetectionIssue>,
) -> DriverWindowSummary {
    let laps: Vec<&LapRecord> = window.laps().filter_map(|n| session.lap(driver, n)).collect();
    let at_incident = session.lap(driver, lap);

    let missing_laps: Vec<u32> = window
        .laps()
        .filter(|n| session.frames(driver, *n).is_empty())
        .collect();
    let telemetry_available = missing_laps.is_empty();

    let telemetry = if telemetry_available {
        let trap_speeds: Vec<f64> = laps
            .iter()
            .filter_map(|l| l.speed_traps.get(WINDOW_TRAP))
            .collect();
        let stats = spread(&trap_speeds);
        CarTelemetrySummary::from_laps(window.laps().map(|n| session.frames(driver, n))).map(
            |car| WindowTelemetry {
                speed_min: stats.map(|s| s.0),
                speed_max: stats.map(|s| s.1),
                speed_variance: stats.map(|s| s.2),
                car,
            },
        )
    } else {
        tracing::debug!(driver, lap, ?missing_laps, "incident window lacks telemetry");
        issues.push(DetectionIssue::TelemetryUnavailable {
            detector: Detector::Incidents,
            driver: driver.to_string(),
            missing_laps,
        });
        None
    };

    DriverWindowSummary {
        driver: driver.to_string(),
        position_before: laps.first().map(|l| l.position),
        position_after: laps.last().map(|l| l.position),
        compound: at_incident.and_then(|l| l.compound.clone()),
        tire_life: at_incident.and_then(|l| l.tire_life),
        laps: laps.iter().copied().map(WindowLap::from).collect(),
        sectors: SectorSummary::over(&laps, lap),
        telemetry_available,
        anomalies: window_anomalies(classifier, &laps, telemetry.is_some()),
        telemetry,
    }
}

/// Speed drops and lost positions between consecutive laps of the window.
/// Speed evidence is only used when the window has telemetry.
fn window_anomalies(
    classifier: &AnomalyClassifier,
    laps: &[&LapRecord],
    with_speed: bool,
) -> Vec<AnomalyFlag> {
    let mut flags = Vec::new();
    for pair in laps.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if prev.lap_number.checked_add(1) != Some(curr.lap_number) {
            continue;
        }
        if with_speed {
            if let (Some(a), Some(b)) = (prev.speed_traps.get(WINDOW_TRAP), curr.speed_traps.get(WINDOW_TRAP)) {
                let delta = b - a;
                if delta < 0.0 {
                    flags.extend(classifier.classify(Metric::Speed(WINDOW_TRAP), curr.lap_number, delta));
                }
            }
        }
        let gained = i64::from(prev.position) - i64::from(curr.position);
        if gained < 0 {
            flags.extend(classifier.classify(Metric::Position, curr.lap_number, gained as f64));
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyThresholds;
    use crate::model::SectorTime;
    use crate::fixtures::{driver, frame, lap_with, message, session_from};
    use crate::raw::RawLap;

    fn classifier() -> AnomalyClassifier {
        AnomalyClassifier::new(AnomalyThresholds::default())
    }

    fn laps_for(code: &str, positions: &[i64], fl: &[f64]) -> Vec<RawLap> {
        positions
            .iter()
            .zip(fl)
            .enumerate()
            .map(|(i, (pos, speed))| {
                lap_with(code, i as i64 + 1, *pos, |l| {
                    l.speed_fl = Some(*speed);
                    l.compound = Some("MEDIUM".into());
                    l.tire_life = Some(i as i64 + 1);
                })
            })
            .collect()
    }

    #[test]
    fn two_driver_message_yields_one_incident() {
        let mut laps = laps_for("VER", &[1, 1, 1, 1, 1, 1], &[300.0; 6]);
        laps.extend(laps_for("HAM", &[2, 2, 2, 2, 2, 2], &[298.0; 6]));
        let session = session_from(
            vec![driver("VER", 1), driver("HAM", 44)],
            laps,
            vec![],
            vec![message(
                Some(3),
                "Other",
                "TURN 1 INCIDENT INVOLVING CARS 1 (VER) AND 44 (HAM) NOTED",
            )],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        assert_eq!(out.items.len(), 1);
        let incident = &out.items[0];
        assert_eq!(incident.drivers, vec!["VER", "HAM"]);
        assert_eq!(incident.summaries.len(), 2);
        assert_eq!(incident.window, Some(LapWindow { first_lap: 1, last_lap: 5 }));
        assert_eq!(incident.steward_action, StewardAction::Noted);
        assert!(!incident.collision);
    }

    #[test]
    fn multi_car_message_stays_a_single_incident() {
        let mut laps = laps_for("NOR", &[3, 3, 3], &[290.0; 3]);
        laps.extend(laps_for("PIA", &[4, 4, 4], &[290.0; 3]));
        laps.extend(laps_for("STR", &[5, 5, 5], &[290.0; 3]));
        let session = session_from(
            vec![driver("NOR", 4), driver("PIA", 81), driver("STR", 18)],
            laps,
            vec![],
            vec![message(Some(2), "CarEvent", "COLLISION INVOLVING CARS 4, 81 AND 18")],
        );
        let out = detect_incidents(&session, &classifier(), 1);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].drivers, vec!["NOR", "PIA", "STR"]);
        assert!(out.items[0].collision);
    }

    #[test]
    fn missing_frames_leave_telemetry_unset() {
        let session = session_from(
            vec![driver("VER", 1)],
            laps_for("VER", &[1, 1, 1, 1, 1], &[300.0, 305.0, 250.0, 300.0, 301.0]),
            vec![],
            vec![message(Some(3), "Other", "INCIDENT INVOLVING CAR 1 (VER) AT TURN 4")],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        let incident = &out.items[0];
        assert!(!incident.telemetry_available);
        let summary = &incident.summaries[0];
        assert!(!summary.telemetry_available);
        assert!(summary.telemetry.is_none());
        assert!(summary.anomalies.is_empty());
        assert!(matches!(
            out.issues[0],
            DetectionIssue::TelemetryUnavailable { ref missing_laps, .. } if missing_laps == &vec![1, 2, 3, 4, 5]
        ));
    }

    #[test]
    fn full_window_telemetry_flags_speed_and_position_drops() {
        let mut frames = Vec::new();
        for lap in 1..=5 {
            frames.push(frame("VER", lap, lap as f64 * 90.0, 280.0, 0.0, 7));
            frames.push(frame("VER", lap, lap as f64 * 90.0 + 1.0, 120.0, 90.0, 3));
        }
        let session = session_from(
            vec![driver("VER", 1)],
            laps_for("VER", &[1, 1, 7, 7, 6], &[300.0, 305.0, 250.0, 300.0, 301.0]),
            frames,
            vec![message(Some(3), "Other", "INCIDENT INVOLVING CAR 1 (VER) AT TURN 4")],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        assert!(out.issues.is_empty());
        let incident = &out.items[0];
        assert!(incident.telemetry_available);

        let summary = &incident.summaries[0];
        assert_eq!((summary.position_before, summary.position_after), (Some(1), Some(6)));
        assert_eq!(summary.compound.as_deref(), Some("MEDIUM"));
        assert_eq!(summary.tire_life, Some(3));

        let telemetry = summary.telemetry.as_ref().unwrap();
        assert_eq!(telemetry.speed_min, Some(250.0));
        assert_eq!(telemetry.speed_max, Some(305.0));
        assert_eq!(telemetry.car.samples, 10);
        assert_eq!(telemetry.car.heavy_braking_samples, 5);

        let metrics: Vec<(&str, u32)> = summary
            .anomalies
            .iter()
            .map(|f| (f.metric.as_str(), f.lap))
            .collect();
        assert_eq!(metrics, vec![("speed_FL", 3), ("position", 3)]);
        assert_eq!(incident.anomaly_count(), 2);
    }

    #[test]
    fn window_keeps_per_lap_timing_without_telemetry() {
        let mut laps = laps_for("HAM", &[2, 2, 4, 4, 3], &[300.0, 302.0, 240.0, 296.0, 299.0]);
        laps[2].sector2 = Some(34.2);
        laps[3].sector2 = Some(34.2);
        laps[3].compound = Some("HARD".into());
        laps[3].pit_out = Some(true);
        laps[4].compound = Some("HARD".into());
        let session = session_from(
            vec![driver("HAM", 44)],
            laps,
            vec![],
            vec![message(Some(3), "Other", "INCIDENT INVOLVING CAR 44 (HAM) AT TURN 10")],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        let summary = &out.items[0].summaries[0];
        assert!(summary.telemetry.is_none());

        let rows: Vec<(u32, u32, Option<f64>)> = summary
            .laps
            .iter()
            .map(|l| (l.lap, l.position, l.speed_traps.fl))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, 2, Some(300.0)),
                (2, 2, Some(302.0)),
                (3, 4, Some(240.0)),
                (4, 4, Some(296.0)),
                (5, 3, Some(299.0)),
            ]
        );
        assert_eq!(summary.laps[2].tire_life, Some(3));
        assert!(summary.laps[3].pit_out);

        let sectors = &summary.sectors;
        assert_eq!(sectors.slowest[1], Some(SectorTime { lap: 3, time: 34.2 }));
        assert_eq!(sectors.slowest[0], Some(SectorTime { lap: 1, time: 25.0 }));
        assert_eq!(sectors.incident_lap, [Some(25.0), Some(34.2), Some(25.0)]);
        assert_eq!(sectors.compounds_used, vec!["MEDIUM", "HARD"]);
    }

    #[test]
    fn window_clamps_at_race_start() {
        let session = session_from(
            vec![driver("VER", 1)],
            laps_for("VER", &[1, 1, 1, 1], &[300.0; 4]),
            vec![],
            vec![message(Some(1), "Other", "CAR 1 (VER) OFF TRACK")],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        assert_eq!(out.items[0].window, Some(LapWindow { first_lap: 1, last_lap: 3 }));
    }

    #[test]
    fn unresolved_and_unplaced_messages_are_kept_with_issues() {
        let session = session_from(
            vec![driver("VER", 1)],
            laps_for("VER", &[1, 1], &[300.0; 2]),
            vec![],
            vec![
                message(Some(2), "Other", "INCIDENT AT TURN 3 UNDER INVESTIGATION"),
                message(None, "Other", "CAR 1 (VER) CRASH IN FORMATION LAP"),
            ],
        );
        let out = detect_incidents(&session, &classifier(), 2);
        assert_eq!(out.items.len(), 2);
        assert!(out.items[0].drivers.is_empty());
        assert!(!out.items[0].telemetry_available);
        assert_eq!(out.items[1].window, None);
        assert!(matches!(out.issues[0], DetectionIssue::Parse { field: "drivers", .. }));
        assert!(matches!(out.issues[1], DetectionIssue::Unplaced { .. }));
    }

    #[test]
    fn flag_messages_without_keywords_are_ignored() {
        let session = session_from(
            vec![driver("VER", 1)],
            laps_for("VER", &[1, 1], &[300.0; 2]),
            vec![],
            vec![message(Some(1), "Flag", "GREEN LIGHT - PIT EXIT OPEN")],
        );
        assert!(detect_incidents(&session, &classifier(), 2).items.is_empty());
    }
}
