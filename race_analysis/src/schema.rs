//! Load-time validation: turns [`RawSession`] tables into a typed [`Session`].
//!
//! This is the only place a session can be rejected. Everything downstream
//! works on typed records and never looks a column up by name.

use crate::error::SchemaError;
use crate::raw::{
    RawDriver, RawLap, RawRaceControlMessage, RawSession, RawTelemetryFrame, RawTrackStatus,
    RawWeatherSample,
};
use crate::session::{Roster, Session, SessionKey};
use crate::types::{
    Driver, LapRecord, MessageCategory, RaceControlMessage, SpeedTraps, TelemetryFrame,
    TrackStatus, TrackStatusPeriod, WeatherSample,
};
use std::collections::BTreeMap;

const LAPS: &str = "laps";
const TELEMETRY: &str = "telemetry";
const RACE_CONTROL: &str = "race_control";
const TRACK_STATUS: &str = "track_status";
const WEATHER: &str = "weather";
const DRIVERS: &str = "drivers";

/// Validates every table and builds the session. Fails on the first
/// problem found, naming the table, row and field.
pub fn validate(key: SessionKey, raw: &RawSession) -> Result<Session, SchemaError> {
    let roster = validate_drivers(&raw.drivers)?;
    let laps = validate_laps(&raw.laps, &roster)?;
    let telemetry = validate_telemetry(&raw.telemetry, &roster)?;
    let race_control = raw
        .race_control
        .iter()
        .enumerate()
        .map(|(row, m)| validate_message(row, m))
        .collect::<Result<Vec<_>, _>>()?;
    let track_status = raw
        .track_status
        .iter()
        .enumerate()
        .map(|(row, p)| validate_track_status(row, p))
        .collect::<Result<Vec<_>, _>>()?;
    let weather = raw
        .weather
        .iter()
        .enumerate()
        .map(|(row, w)| validate_weather(row, w))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        session = %key,
        drivers = roster.len(),
        laps = raw.laps.len(),
        frames = raw.telemetry.len(),
        messages = race_control.len(),
        "session validated"
    );

    Ok(Session::from_parts(
        key,
        laps,
        telemetry,
        race_control,
        track_status,
        weather,
        roster,
    ))
}

fn required<T: Clone>(
    value: &Option<T>,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<T, SchemaError> {
    value
        .clone()
        .ok_or_else(|| SchemaError::new(table, Some(row), field, "is missing"))
}

fn required_text(
    value: &Option<String>,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<String, SchemaError> {
    let text = required(value, table, row, field)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SchemaError::new(table, Some(row), field, "is empty"));
    }
    Ok(trimmed.to_string())
}

fn positive_int(
    value: i64,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<u32, SchemaError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| {
            SchemaError::new(table, Some(row), field, format!("must be a positive integer, got {value}"))
        })
}

fn finite(
    value: f64,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<f64, SchemaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SchemaError::new(table, Some(row), field, "must be a finite number"))
    }
}

fn non_negative(
    value: f64,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<f64, SchemaError> {
    let value = finite(value, table, row, field)?;
    if value < 0.0 {
        return Err(SchemaError::new(
            table,
            Some(row),
            field,
            format!("must not be negative, got {value}"),
        ));
    }
    Ok(value)
}

fn optional_non_negative(
    value: Option<f64>,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<Option<f64>, SchemaError> {
    value.map(|v| non_negative(v, table, row, field)).transpose()
}

fn validate_drivers(rows: &[RawDriver]) -> Result<Roster, SchemaError> {
    if rows.is_empty() {
        return Err(SchemaError::new(DRIVERS, None, "*", "table is empty"));
    }
    let mut roster = Roster::default();
    for (row, raw) in rows.iter().enumerate() {
        let code = required_text(&raw.code, DRIVERS, row, "code")?.to_ascii_uppercase();
        let full_name = required_text(&raw.full_name, DRIVERS, row, "full_name")?;
        let team = required_text(&raw.team, DRIVERS, row, "team")?;
        let car_number = required(&raw.car_number, DRIVERS, row, "car_number")?
            .parse()
            .ok_or_else(|| {
                SchemaError::new(DRIVERS, Some(row), "car_number", "must be a positive integer")
            })?;
        let classified_position = raw
            .classified_position
            .map(|p| positive_int(p, DRIVERS, row, "classified_position"))
            .transpose()?;

        if roster.contains(&code) {
            return Err(SchemaError::new(
                DRIVERS,
                Some(row),
                "code",
                format!("duplicates driver {code}"),
            ));
        }
        if roster.contains_number(car_number) {
            return Err(SchemaError::new(
                DRIVERS,
                Some(row),
                "car_number",
                format!("duplicates car number {car_number}"),
            ));
        }
        roster.insert(Driver {
            code,
            full_name,
            team,
            car_number,
            classified_position,
        });
    }
    Ok(roster)
}

fn known_driver(
    value: &Option<String>,
    roster: &Roster,
    table: &'static str,
    row: usize,
) -> Result<String, SchemaError> {
    let code = required_text(value, table, row, "driver")?.to_ascii_uppercase();
    if !roster.contains(&code) {
        return Err(SchemaError::new(
            table,
            Some(row),
            "driver",
            format!("names unknown driver {code}"),
        ));
    }
    Ok(code)
}

fn validate_lap(row: usize, raw: &RawLap, roster: &Roster) -> Result<LapRecord, SchemaError> {
    let driver = known_driver(&raw.driver, roster, LAPS, row)?;
    let lap_number = positive_int(required(&raw.lap_number, LAPS, row, "lap_number")?, LAPS, row, "lap_number")?;
    let position = positive_int(required(&raw.position, LAPS, row, "position")?, LAPS, row, "position")?;
    let lap_time = optional_non_negative(raw.lap_time, LAPS, row, "lap_time")?;
    let sectors = [
        optional_non_negative(raw.sector1, LAPS, row, "sector1")?,
        optional_non_negative(raw.sector2, LAPS, row, "sector2")?,
        optional_non_negative(raw.sector3, LAPS, row, "sector3")?,
    ];
    let speed_traps = SpeedTraps {
        i1: optional_non_negative(raw.speed_i1, LAPS, row, "speed_I1")?,
        i2: optional_non_negative(raw.speed_i2, LAPS, row, "speed_I2")?,
        fl: optional_non_negative(raw.speed_fl, LAPS, row, "speed_FL")?,
        st: optional_non_negative(raw.speed_st, LAPS, row, "speed_ST")?,
    };
    let tire_life = raw
        .tire_life
        .map(|t| {
            u32::try_from(t).map_err(|_| {
                SchemaError::new(LAPS, Some(row), "tire_life", format!("must not be negative, got {t}"))
            })
        })
        .transpose()?;
    let compound = raw
        .compound
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase);

    Ok(LapRecord {
        driver,
        lap_number,
        lap_time,
        sectors,
        speed_traps,
        position,
        compound,
        tire_life,
        pit_in: raw.pit_in.unwrap_or(false),
        pit_out: raw.pit_out.unwrap_or(false),
    })
}

fn validate_laps(
    rows: &[RawLap],
    roster: &Roster,
) -> Result<BTreeMap<String, Vec<LapRecord>>, SchemaError> {
    if rows.is_empty() {
        return Err(SchemaError::new(LAPS, None, "*", "table is empty"));
    }
    let mut by_driver: BTreeMap<String, Vec<LapRecord>> = BTreeMap::new();
    for (row, raw) in rows.iter().enumerate() {
        let lap = validate_lap(row, raw, roster)?;
        let laps = by_driver.entry(lap.driver.clone()).or_default();
        if let Some(prev) = laps.last() {
            if lap.lap_number == prev.lap_number {
                return Err(SchemaError::new(
                    LAPS,
                    Some(row),
                    "lap_number",
                    format!("duplicates lap {} for {}", lap.lap_number, lap.driver),
                ));
            }
            if lap.lap_number < prev.lap_number {
                return Err(SchemaError::new(
                    LAPS,
                    Some(row),
                    "lap_number",
                    format!(
                        "is not monotonic for {}: {} follows {}",
                        lap.driver, lap.lap_number, prev.lap_number
                    ),
                ));
            }
        }
        laps.push(lap);
    }
    Ok(by_driver)
}

fn validate_frame(
    row: usize,
    raw: &RawTelemetryFrame,
    roster: &Roster,
) -> Result<(String, u32, TelemetryFrame), SchemaError> {
    let driver = known_driver(&raw.driver, roster, TELEMETRY, row)?;
    let lap_number = positive_int(
        required(&raw.lap_number, TELEMETRY, row, "lap_number")?,
        TELEMETRY,
        row,
        "lap_number",
    )?;
    // Columns are checked in table order so the first missing one is reported.
    let timestamp = non_negative(required(&raw.timestamp, TELEMETRY, row, "timestamp")?, TELEMETRY, row, "timestamp")?;
    let speed = non_negative(required(&raw.speed, TELEMETRY, row, "speed")?, TELEMETRY, row, "speed")?;
    let throttle = non_negative(required(&raw.throttle, TELEMETRY, row, "throttle")?, TELEMETRY, row, "throttle")?;
    let brake = non_negative(required(&raw.brake, TELEMETRY, row, "brake")?, TELEMETRY, row, "brake")?;
    let gear = required(&raw.gear, TELEMETRY, row, "gear")?;
    let gear = u8::try_from(gear).map_err(|_| {
        SchemaError::new(TELEMETRY, Some(row), "gear", format!("out of range: {gear}"))
    })?;
    let frame = TelemetryFrame {
        timestamp,
        speed,
        throttle,
        brake,
        gear,
        rpm: non_negative(required(&raw.rpm, TELEMETRY, row, "rpm")?, TELEMETRY, row, "rpm")?,
        x: raw.x.map(|v| finite(v, TELEMETRY, row, "x")).transpose()?,
        y: raw.y.map(|v| finite(v, TELEMETRY, row, "y")).transpose()?,
    };
    Ok((driver, lap_number, frame))
}

fn validate_telemetry(
    rows: &[RawTelemetryFrame],
    roster: &Roster,
) -> Result<BTreeMap<(String, u32), Vec<TelemetryFrame>>, SchemaError> {
    let mut frames: BTreeMap<(String, u32), Vec<TelemetryFrame>> = BTreeMap::new();
    for (row, raw) in rows.iter().enumerate() {
        let (driver, lap, frame) = validate_frame(row, raw, roster)?;
        frames.entry((driver, lap)).or_default().push(frame);
    }
    for lap_frames in frames.values_mut() {
        lap_frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }
    Ok(frames)
}

fn validate_message(row: usize, raw: &RawRaceControlMessage) -> Result<RaceControlMessage, SchemaError> {
    let category = required_text(&raw.category, RACE_CONTROL, row, "category")?;
    let message = required_text(&raw.message, RACE_CONTROL, row, "message")?;
    let lap = raw
        .lap_number
        .map(|l| positive_int(l, RACE_CONTROL, row, "lap_number"))
        .transpose()?;
    let racing_number = raw
        .racing_number
        .as_ref()
        .map(|n| {
            n.parse().ok_or_else(|| {
                SchemaError::new(RACE_CONTROL, Some(row), "racing_number", "must be a positive integer")
            })
        })
        .transpose()?;
    Ok(RaceControlMessage {
        lap,
        category: MessageCategory::from_label(&category),
        message,
        flag: raw
            .flag
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string),
        racing_number,
    })
}

fn validate_track_status(row: usize, raw: &RawTrackStatus) -> Result<TrackStatusPeriod, SchemaError> {
    let code = required_text(&raw.status, TRACK_STATUS, row, "status")?;
    let status = TrackStatus::from_code(&code).ok_or_else(|| {
        SchemaError::new(TRACK_STATUS, Some(row), "status", format!("unknown status `{code}`"))
    })?;
    let lap_start = positive_int(
        required(&raw.lap_start, TRACK_STATUS, row, "lap_start")?,
        TRACK_STATUS,
        row,
        "lap_start",
    )?;
    let lap_end = raw
        .lap_end
        .map(|l| positive_int(l, TRACK_STATUS, row, "lap_end"))
        .transpose()?;
    if let Some(end) = lap_end {
        if end < lap_start {
            return Err(SchemaError::new(
                TRACK_STATUS,
                Some(row),
                "lap_end",
                format!("{end} precedes lap_start {lap_start}"),
            ));
        }
    }
    Ok(TrackStatusPeriod {
        status,
        lap_start,
        lap_end,
    })
}

fn validate_weather(row: usize, raw: &RawWeatherSample) -> Result<WeatherSample, SchemaError> {
    let humidity = non_negative(required(&raw.humidity, WEATHER, row, "humidity")?, WEATHER, row, "humidity")?;
    if humidity > 100.0 {
        return Err(SchemaError::new(WEATHER, Some(row), "humidity", "must be a percentage"));
    }
    Ok(WeatherSample {
        timestamp: non_negative(required(&raw.timestamp, WEATHER, row, "timestamp")?, WEATHER, row, "timestamp")?,
        air_temp: finite(required(&raw.air_temp, WEATHER, row, "air_temp")?, WEATHER, row, "air_temp")?,
        track_temp: finite(required(&raw.track_temp, WEATHER, row, "track_temp")?, WEATHER, row, "track_temp")?,
        humidity,
        wind_speed: non_negative(required(&raw.wind_speed, WEATHER, row, "wind_speed")?, WEATHER, row, "wind_speed")?,
        rainfall: required(&raw.rainfall, WEATHER, row, "rainfall")?,
    })
}
