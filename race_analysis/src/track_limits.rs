use crate::anomaly::AnomalyClassifier;
use crate::error::{DetectionIssue, Detector};
use crate::incidents::message_drivers;
use crate::model::{Detection, LapComparison, SpeedRange, TrackLimitsViolation};
use crate::patterns::{self, StewardAction};
use crate::position_changes::comparison_anomalies;
use crate::session::Session;
use crate::types::{LapRecord, MessageCategory, RaceControlMessage};

fn qualifies(msg: &RaceControlMessage) -> bool {
    msg.category == MessageCategory::TrackLimits || patterns::mentions_track_limits(&msg.message)
}

fn speed_range(lap: &LapRecord) -> Option<SpeedRange> {
    lap.speed_traps.readings().fold(None, |range, (_, v)| {
        Some(match range {
            None => SpeedRange { min: v, max: v },
            Some(r) => SpeedRange {
                min: r.min.min(v),
                max: r.max.max(v),
            },
        })
    })
}

/// One violation per track-limits message. Unparseable turns and drivers are
/// left `None` and reported as issues.
pub fn detect_track_limits(
    session: &Session,
    classifier: &AnomalyClassifier,
) -> Detection<TrackLimitsViolation> {
    let mut out = Detection::default();

    for (message_index, msg) in session.race_control().iter().enumerate() {
        if !qualifies(msg) {
            continue;
        }
        let turn = patterns::parse_turn(&msg.message);
        if turn.is_none() {
            out.issues.push(DetectionIssue::Parse {
                detector: Detector::TrackLimits,
                field: "turn",
                lap: msg.lap,
                message: msg.message.clone(),
            });
        }
        let driver = message_drivers(session, msg).into_iter().next();
        if driver.is_none() {
            out.issues.push(DetectionIssue::Parse {
                detector: Detector::TrackLimits,
                field: "driver",
                lap: msg.lap,
                message: msg.message.clone(),
            });
        }
        if msg.lap.is_none() {
            out.issues.push(DetectionIssue::Unplaced {
                detector: Detector::TrackLimits,
                message: msg.message.clone(),
            });
        }

        let record = match (&driver, msg.lap) {
            (Some(d), Some(lap)) => {
                let record = session.lap(d, lap);
                if record.is_none() {
                    out.issues.push(DetectionIssue::TelemetryUnavailable {
                        detector: Detector::TrackLimits,
                        driver: d.clone(),
                        missing_laps: vec![lap],
                    });
                }
                record
            }
            _ => None,
        };
        let previous = record.and_then(|r| session.lap(&r.driver, r.lap_number.checked_sub(1)?));
        let comparison = record
            .zip(previous)
            .map(|(curr, prev)| LapComparison::between(prev, curr));
        let anomalies = match (&comparison, record) {
            (Some(c), Some(r)) => comparison_anomalies(classifier, r.lap_number, c),
            _ => Vec::new(),
        };

        out.items.push(TrackLimitsViolation {
            message_index,
            driver,
            lap: msg.lap,
            turn,
            message: msg.message.clone(),
            steward_action: StewardAction::parse(&msg.message),
            deleted_lap_time: patterns::parse_deleted_time(&msg.message),
            lap_time: record.and_then(|r| r.lap_time),
            lap_time_delta: comparison.as_ref().and_then(|c| c.lap_time_delta),
            speed_range: record.and_then(speed_range),
            sectors: record.map(|r| r.sectors).unwrap_or([None; 3]),
            anomalies,
        });
    }

    tracing::debug!(
        violations = out.items.len(),
        issues = out.issues.len(),
        "track limits analysis finished"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyThresholds;
    use crate::fixtures::{driver, lap, lap_with, message, session_from};
    use crate::raw::CarNumber;

    fn classifier() -> AnomalyClassifier {
        AnomalyClassifier::new(AnomalyThresholds::default())
    }

    fn verstappen_laps() -> Vec<crate::raw::RawLap> {
        vec![
            lap_with("VER", 35, 1, |l| l.speed_fl = Some(290.0)),
            lap_with("VER", 36, 1, |l| {
                l.lap_time = Some(77.5);
                l.speed_i1 = Some(260.0);
                l.speed_i2 = Some(301.0);
                l.speed_fl = Some(270.0);
                l.speed_st = Some(318.0);
            }),
        ]
    }

    #[test]
    fn parses_turn_and_driver_from_tagged_message() {
        let session = session_from(
            vec![driver("VER", 1), driver("HAM", 44)],
            verstappen_laps(),
            vec![],
            vec![message(
                Some(36),
                "Other",
                "CAR 1 (VER) TIME 1:17.500 DELETED - TRACK LIMITS AT TURN 2 LAP 36 15:04:22",
            )],
        );
        let out = detect_track_limits(&session, &classifier());
        assert!(out.issues.is_empty());
        let v = &out.items[0];
        assert_eq!(v.driver.as_deref(), Some("VER"));
        assert_eq!((v.lap, v.turn), (Some(36), Some(2)));
        assert_eq!(v.deleted_lap_time, Some(77.5));
        assert_eq!(v.steward_action, StewardAction::LapTimeDeleted);
        assert_eq!(v.speed_range, Some(SpeedRange { min: 260.0, max: 318.0 }));
        assert_eq!(v.lap_time_delta, Some(-2.5));
        assert_eq!(v.sectors, [Some(25.0), Some(30.0), Some(25.0)]);
        let metrics: Vec<&str> = v.anomalies.iter().map(|f| f.metric.as_str()).collect();
        assert_eq!(metrics, vec!["lap_time", "speed_FL"]);
    }

    #[test]
    fn racing_number_column_resolves_driver() {
        let mut msg = message(Some(36), "TrackLimits", "TRACK LIMITS AT TURN 2");
        msg.racing_number = Some(CarNumber::Text("1".into()));
        let session = session_from(vec![driver("VER", 1)], verstappen_laps(), vec![], vec![msg]);
        let out = detect_track_limits(&session, &classifier());
        let v = &out.items[0];
        assert_eq!((v.driver.as_deref(), v.lap, v.turn), (Some("VER"), Some(36), Some(2)));
    }

    #[test]
    fn unparseable_turn_is_recorded_as_none() {
        let session = session_from(
            vec![driver("VER", 1)],
            verstappen_laps(),
            vec![],
            vec![message(Some(36), "Other", "CAR 1 (VER) TRACK LIMITS AT THE CHICANE")],
        );
        let out = detect_track_limits(&session, &classifier());
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].turn, None);
        assert!(matches!(out.issues[0], DetectionIssue::Parse { field: "turn", .. }));
    }

    #[test]
    fn missing_lap_record_keeps_violation_without_timing() {
        let session = session_from(
            vec![driver("VER", 1), driver("HAM", 44)],
            vec![lap("VER", 1, 1), lap("HAM", 1, 2)],
            vec![],
            vec![message(Some(20), "Other", "CAR 44 (HAM) TRACK LIMITS AT TURN 9")],
        );
        let out = detect_track_limits(&session, &classifier());
        let v = &out.items[0];
        assert_eq!(v.driver.as_deref(), Some("HAM"));
        assert_eq!(v.turn, Some(9));
        assert_eq!((v.lap_time, v.speed_range), (None, None));
        assert!(matches!(out.issues[0], DetectionIssue::TelemetryUnavailable { .. }));
    }

    #[test]
    fn ignores_non_track_limits_messages() {
        let session = session_from(
            vec![driver("VER", 1)],
            verstappen_laps(),
            vec![],
            vec![message(Some(35), "Flag", "YELLOW IN TRACK SECTOR 7")],
        );
        assert!(detect_track_limits(&session, &classifier()).items.is_empty());
    }
}
