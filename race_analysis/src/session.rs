use crate::types::{
    Driver, LapRecord, RaceControlMessage, TelemetryFrame, TrackStatusPeriod, WeatherSample,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lookup key for one race session, e.g. `("Hungarian Grand Prix", "R")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub race: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(race: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            race: race.into(),
            session: session.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.race, self.session)
    }
}

/// Driver metadata indexed by code and by car number.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_code: BTreeMap<String, Driver>,
    by_number: HashMap<u32, String>,
}

impl Roster {
    pub(crate) fn insert(&mut self, driver: Driver) {
        self.by_number.insert(driver.car_number, driver.code.clone());
        self.by_code.insert(driver.code.clone(), driver);
    }

    pub fn get(&self, code: &str) -> Option<&Driver> {
        self.by_code.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn code_for_number(&self, number: u32) -> Option<&str> {
        self.by_number.get(&number).map(String::as_str)
    }

    pub fn contains_number(&self, number: u32) -> bool {
        self.by_number.contains_key(&number)
    }

    /// Drivers in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Driver> {
        self.by_code.values()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// A validated, read-only race session. Only [`crate::schema::validate`]
/// builds one, so every consumer can rely on the typed fields.
#[derive(Debug, Clone)]
pub struct Session {
    key: SessionKey,
    laps: BTreeMap<String, Vec<LapRecord>>,
    telemetry: BTreeMap<(String, u32), Vec<TelemetryFrame>>,
    race_control: Vec<RaceControlMessage>,
    track_status: Vec<TrackStatusPeriod>,
    weather: Vec<WeatherSample>,
    roster: Roster,
}

impl Session {
    pub(crate) fn from_parts(
        key: SessionKey,
        laps: BTreeMap<String, Vec<LapRecord>>,
        telemetry: BTreeMap<(String, u32), Vec<TelemetryFrame>>,
        race_control: Vec<RaceControlMessage>,
        track_status: Vec<TrackStatusPeriod>,
        weather: Vec<WeatherSample>,
        roster: Roster,
    ) -> Self {
        Self {
            key,
            laps,
            telemetry,
            race_control,
            track_status,
            weather,
            roster,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Laps per driver, drivers in code order and laps in lap order.
    pub fn laps_by_driver(&self) -> impl Iterator<Item = (&str, &[LapRecord])> {
        self.laps.iter().map(|(d, laps)| (d.as_str(), laps.as_slice()))
    }

    pub fn driver_laps(&self, driver: &str) -> &[LapRecord] {
        self.laps.get(driver).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lap(&self, driver: &str, lap_number: u32) -> Option<&LapRecord> {
        let laps = self.driver_laps(driver);
        laps.binary_search_by_key(&lap_number, |l| l.lap_number)
            .ok()
            .map(|i| &laps[i])
    }

    /// Frames for one driver and lap, ordered by timestamp.
    pub fn frames(&self, driver: &str, lap_number: u32) -> &[TelemetryFrame] {
        self.telemetry
            .get(&(driver.to_string(), lap_number))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn race_control(&self) -> &[RaceControlMessage] {
        &self.race_control
    }

    pub fn track_status(&self) -> &[TrackStatusPeriod] {
        &self.track_status
    }

    pub fn weather(&self) -> &[WeatherSample] {
        &self.weather
    }

    /// Highest lap number any driver completed.
    pub fn last_lap(&self) -> u32 {
        self.laps
            .values()
            .filter_map(|laps| laps.last())
            .map(|l| l.lap_number)
            .max()
            .unwrap_or(0)
    }

    pub fn lap_record_count(&self) -> usize {
        self.laps.values().map(Vec::len).sum()
    }
}
