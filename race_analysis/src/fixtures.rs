//! Builders for small sessions used across the unit tests.

use crate::raw::{CarNumber, RawDriver, RawLap, RawRaceControlMessage, RawSession, RawTelemetryFrame};
use crate::schema;
use crate::session::{Session, SessionKey};

pub fn driver(code: &str, number: i64) -> RawDriver {
    RawDriver {
        code: Some(code.into()),
        full_name: Some(format!("Driver {code}")),
        team: Some(format!("Team {code}")),
        car_number: Some(CarNumber::Int(number)),
        classified_position: None,
    }
}

pub fn lap(code: &str, lap_number: i64, position: i64) -> RawLap {
    RawLap {
        driver: Some(code.into()),
        lap_number: Some(lap_number),
        position: Some(position),
        lap_time: Some(80.0),
        sector1: Some(25.0),
        sector2: Some(30.0),
        sector3: Some(25.0),
        ..RawLap::default()
    }
}

pub fn lap_with(code: &str, lap_number: i64, position: i64, edit: impl FnOnce(&mut RawLap)) -> RawLap {
    let mut raw = lap(code, lap_number, position);
    edit(&mut raw);
    raw
}

pub fn frame(code: &str, lap: i64, timestamp: f64, speed: f64, brake: f64, gear: i64) -> RawTelemetryFrame {
    RawTelemetryFrame {
        driver: Some(code.into()),
        lap_number: Some(lap),
        timestamp: Some(timestamp),
        speed: Some(speed),
        throttle: Some(if brake > 0.0 { 0.0 } else { 100.0 }),
        brake: Some(brake),
        gear: Some(gear),
        rpm: Some(11_000.0),
        x: None,
        y: None,
    }
}

pub fn message(lap: Option<i64>, category: &str, text: &str) -> RawRaceControlMessage {
    RawRaceControlMessage {
        lap_number: lap,
        category: Some(category.into()),
        message: Some(text.into()),
        flag: None,
        racing_number: None,
    }
}

/// Two drivers, three laps each, VER leading throughout.
pub fn minimal_session() -> RawSession {
    RawSession {
        drivers: vec![driver("VER", 1), driver("HAM", 44)],
        laps: (1..=3)
            .flat_map(|n| [lap("VER", n, 1), lap("HAM", n, 2)])
            .collect(),
        ..RawSession::default()
    }
}

pub fn session_from(
    drivers: Vec<RawDriver>,
    laps: Vec<RawLap>,
    telemetry: Vec<RawTelemetryFrame>,
    race_control: Vec<RawRaceControlMessage>,
) -> Session {
    let raw = RawSession {
        drivers,
        laps,
        telemetry,
        race_control,
        ..RawSession::default()
    };
    schema::validate(SessionKey::new("Test Grand Prix", "R"), &raw)
        .unwrap_or_else(|err| panic!("fixture session is invalid: {err}"))
}
