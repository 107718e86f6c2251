//! Session-level summaries that do not come from a detector: classification,
//! weather, pit stops and neutralisation periods.

use crate::patterns;
use crate::session::Session;
use crate::types::{TrackStatus, WeatherSample};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedDriver {
    pub position: u32,
    pub code: String,
    pub full_name: String,
    pub team: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceOverview {
    pub race: String,
    pub session: String,
    pub winner: Option<ClassifiedDriver>,
    pub podium: Vec<ClassifiedDriver>,
    pub total_laps: u32,
    pub total_drivers: usize,
    pub total_lap_records: usize,
}

/// Classification comes from the roster when the provider supplied it,
/// otherwise from each driver's last recorded lap: more laps first, then
/// the position held on that lap.
pub fn race_overview(session: &Session) -> RaceOverview {
    let roster = session.roster();
    let mut order: Vec<(u32, &str)> = roster
        .iter()
        .filter_map(|d| d.classified_position.map(|p| (p, d.code.as_str())))
        .collect();

    if order.is_empty() {
        let mut finals: Vec<(u32, u32, &str)> = session
            .laps_by_driver()
            .filter_map(|(code, laps)| laps.last().map(|l| (l.lap_number, l.position, code)))
            .collect();
        finals.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(b.2)));
        order = finals
            .into_iter()
            .enumerate()
            .map(|(i, (_, _, code))| (i as u32 + 1, code))
            .collect();
    } else {
        order.sort();
    }

    let podium: Vec<ClassifiedDriver> = order
        .iter()
        .take(3)
        .filter_map(|&(position, code)| {
            roster.get(code).map(|d| ClassifiedDriver {
                position,
                code: d.code.clone(),
                full_name: d.full_name.clone(),
                team: d.team.clone(),
            })
        })
        .collect();

    RaceOverview {
        race: session.key().race.clone(),
        session: session.key().session.clone(),
        winner: podium.first().cloned(),
        podium,
        total_laps: session.last_lap(),
        total_drivers: roster.len(),
        total_lap_records: session.lap_record_count(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl Range {
    fn over(samples: &[WeatherSample], field: impl Fn(&WeatherSample) -> f64) -> Option<Self> {
        let first = field(samples.first()?);
        let (min, max, sum) = samples.iter().map(&field).fold(
            (first, first, 0.0),
            |(min, max, sum), v| (min.min(v), max.max(v), sum + v),
        );
        Some(Range {
            min,
            max,
            avg: sum / samples.len() as f64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub samples: usize,
    pub air_temp: Range,
    pub track_temp: Range,
    pub humidity: Range,
    pub wind_speed: Range,
    pub rainfall: bool,
}

/// `None` when the session has no weather samples.
pub fn weather_summary(session: &Session) -> Option<WeatherSummary> {
    let samples = session.weather();
    Some(WeatherSummary {
        samples: samples.len(),
        air_temp: Range::over(samples, |s| s.air_temp)?,
        track_temp: Range::over(samples, |s| s.track_temp)?,
        humidity: Range::over(samples, |s| s.humidity)?,
        wind_speed: Range::over(samples, |s| s.wind_speed)?,
        rainfall: samples.iter().any(|s| s.rainfall),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitStop {
    pub driver: String,
    pub lap: u32,
    pub compound_before: Option<String>,
    pub tire_life_before: Option<u32>,
    pub compound_after: Option<String>,
    pub position_before: Option<u32>,
    pub position_after: Option<u32>,
    /// Places gained across the stop, negative when lost.
    pub position_change: Option<i64>,
}

/// Every pit-in lap, ordered by lap then driver.
pub fn pit_stops(session: &Session) -> Vec<PitStop> {
    let mut stops: Vec<PitStop> = session
        .laps_by_driver()
        .flat_map(|(driver, laps)| {
            laps.iter().filter(|l| l.pit_in).map(move |l| {
                let before = l.lap_number.checked_sub(1).and_then(|n| session.lap(driver, n));
                let after = l.lap_number.checked_add(1).and_then(|n| session.lap(driver, n));
                PitStop {
                    driver: driver.to_string(),
                    lap: l.lap_number,
                    compound_before: l.compound.clone(),
                    tire_life_before: l.tire_life,
                    compound_after: after.and_then(|a| a.compound.clone()),
                    position_before: before.map(|b| b.position),
                    position_after: after.map(|a| a.position),
                    position_change: before
                        .zip(after)
                        .map(|(b, a)| i64::from(b.position) - i64::from(a.position)),
                }
            })
        })
        .collect();
    stops.sort_by(|a, b| a.lap.cmp(&b.lap).then_with(|| a.driver.cmp(&b.driver)));
    stops
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    TrackStatus,
    RaceControl,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YellowFlag {
    pub source: FlagSource,
    pub status: TrackStatus,
    pub lap: Option<u32>,
    pub lap_end: Option<u32>,
    /// Marshalling sector named in a race-control message.
    pub sector: Option<u32>,
    pub text: String,
}

/// Non-clear track-status periods followed by race-control messages that
/// mention a yellow flag, each in session order.
pub fn yellow_flags(session: &Session) -> Vec<YellowFlag> {
    let periods = session
        .track_status()
        .iter()
        .filter(|p| p.status != TrackStatus::Clear)
        .map(|p| YellowFlag {
            source: FlagSource::TrackStatus,
            status: p.status,
            lap: Some(p.lap_start),
            lap_end: p.lap_end,
            sector: None,
            text: p.status.to_string(),
        });
    let messages = session
        .race_control()
        .iter()
        .filter(|m| patterns::mentions_yellow(&m.message))
        .map(|m| YellowFlag {
            source: FlagSource::RaceControl,
            status: TrackStatus::Yellow,
            lap: m.lap,
            lap_end: m.lap,
            sector: patterns::parse_sector(&m.message),
            text: m.message.clone(),
        });
    periods.chain(messages).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{driver, lap, lap_with, message, minimal_session};
    use crate::raw::{RawTrackStatus, RawWeatherSample};
    use crate::schema;
    use crate::session::SessionKey;

    fn validate(raw: &crate::raw::RawSession) -> Session {
        schema::validate(SessionKey::new("Test Grand Prix", "R"), raw)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    #[test]
    fn overview_falls_back_to_final_lap_order() {
        let mut raw = minimal_session();
        raw.drivers.push(driver("ALO", 14));
        raw.laps.push(lap("ALO", 1, 3));
        let overview = race_overview(&validate(&raw));
        let podium: Vec<&str> = overview.podium.iter().map(|d| d.code.as_str()).collect();
        // ALO retired after lap 1 so ranks behind both finishers.
        assert_eq!(podium, vec!["VER", "HAM", "ALO"]);
        assert_eq!(overview.winner.map(|w| w.code), Some("VER".to_string()));
        assert_eq!(overview.total_laps, 3);
        assert_eq!(overview.total_drivers, 3);
        assert_eq!(overview.total_lap_records, 7);
    }

    #[test]
    fn overview_prefers_classified_positions() {
        let mut raw = minimal_session();
        raw.drivers[0].classified_position = Some(2);
        raw.drivers[1].classified_position = Some(1);
        let overview = race_overview(&validate(&raw));
        let winner = overview.winner.unwrap();
        assert_eq!((winner.code.as_str(), winner.position), ("HAM", 1));
        assert_eq!(overview.podium.len(), 2);
    }

    #[test]
    fn weather_summary_is_none_without_samples() {
        assert!(weather_summary(&validate(&minimal_session())).is_none());
    }

    #[test]
    fn weather_summary_aggregates_samples() {
        let mut raw = minimal_session();
        raw.weather = [(0.0, 24.0, false), (60.0, 26.0, true)]
            .into_iter()
            .map(|(ts, air, rain)| RawWeatherSample {
                timestamp: Some(ts),
                air_temp: Some(air),
                track_temp: Some(40.0),
                humidity: Some(55.0),
                wind_speed: Some(1.5),
                rainfall: Some(rain),
            })
            .collect();
        let summary = weather_summary(&validate(&raw)).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.air_temp, Range { min: 24.0, max: 26.0, avg: 25.0 });
        assert_eq!(summary.track_temp.avg, 40.0);
        assert!(summary.rainfall);
    }

    #[test]
    fn pit_stops_record_neighbouring_laps() {
        let mut raw = minimal_session();
        raw.laps[2] = lap_with("VER", 2, 1, |l| {
            l.pit_in = Some(true);
            l.compound = Some("MEDIUM".into());
            l.tire_life = Some(21);
        });
        raw.laps[4] = lap_with("VER", 3, 2, |l| l.compound = Some("HARD".into()));
        let stops = pit_stops(&validate(&raw));
        assert_eq!(
            stops,
            vec![PitStop {
                driver: "VER".into(),
                lap: 2,
                compound_before: Some("MEDIUM".into()),
                tire_life_before: Some(21),
                compound_after: Some("HARD".into()),
                position_before: Some(1),
                position_after: Some(2),
                position_change: Some(-1),
            }]
        );
    }

    #[test]
    fn yellow_flags_merge_status_periods_and_messages() {
        let mut raw = minimal_session();
        raw.track_status = vec![
            RawTrackStatus {
                status: Some("1".into()),
                lap_start: Some(1),
                lap_end: Some(1),
            },
            RawTrackStatus {
                status: Some("4".into()),
                lap_start: Some(2),
                lap_end: None,
            },
        ];
        raw.race_control = vec![
            message(Some(2), "Flag", "DOUBLE YELLOW IN TRACK SECTOR 4"),
            message(Some(3), "Flag", "GREEN LIGHT - PIT EXIT OPEN"),
        ];
        let flags = yellow_flags(&validate(&raw));
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].source, FlagSource::TrackStatus);
        assert_eq!(flags[0].status, TrackStatus::SafetyCar);
        assert_eq!((flags[0].lap, flags[0].lap_end), (Some(2), None));
        assert_eq!(flags[1].text, "DOUBLE YELLOW IN TRACK SECTOR 4");
        assert_eq!(flags[0].sector, None);
        assert_eq!(flags[1].sector, Some(4));
    }

    #[test]
    fn pit_stop_on_the_last_representable_lap() {
        let mut raw = minimal_session();
        raw.laps.push(lap_with("VER", i64::from(u32::MAX), 1, |l| l.pit_in = Some(true)));
        let stops = pit_stops(&validate(&raw));
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].lap, u32::MAX);
        assert_eq!(stops[0].position_after, None);
        assert_eq!(stops[0].position_change, None);
    }

    #[test]
    fn pit_stop_without_a_following_lap_has_no_position_change() {
        let mut raw = minimal_session();
        raw.laps[4] = lap_with("VER", 3, 1, |l| l.pit_in = Some(true));
        let stops = pit_stops(&validate(&raw));
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].position_before, Some(1));
        assert_eq!(stops[0].position_change, None);
    }
}
