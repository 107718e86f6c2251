use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed speed measurement points on the lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpeedTrap {
    I1,
    I2,
    #[serde(rename = "FL")]
    FinishLine,
    #[serde(rename = "ST")]
    SpeedTrap,
}

impl SpeedTrap {
    pub const ALL: [SpeedTrap; 4] = [
        SpeedTrap::I1,
        SpeedTrap::I2,
        SpeedTrap::FinishLine,
        SpeedTrap::SpeedTrap,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SpeedTrap::I1 => "I1",
            SpeedTrap::I2 => "I2",
            SpeedTrap::FinishLine => "FL",
            SpeedTrap::SpeedTrap => "ST",
        }
    }
}

/// One reading per speed trap; also reused for lap-over-lap deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedTraps {
    #[serde(rename = "I1")]
    pub i1: Option<f64>,
    #[serde(rename = "I2")]
    pub i2: Option<f64>,
    #[serde(rename = "FL")]
    pub fl: Option<f64>,
    #[serde(rename = "ST")]
    pub st: Option<f64>,
}

impl SpeedTraps {
    pub fn get(&self, trap: SpeedTrap) -> Option<f64> {
        match trap {
            SpeedTrap::I1 => self.i1,
            SpeedTrap::I2 => self.i2,
            SpeedTrap::FinishLine => self.fl,
            SpeedTrap::SpeedTrap => self.st,
        }
    }

    fn slot(&mut self, trap: SpeedTrap) -> &mut Option<f64> {
        match trap {
            SpeedTrap::I1 => &mut self.i1,
            SpeedTrap::I2 => &mut self.i2,
            SpeedTrap::FinishLine => &mut self.fl,
            SpeedTrap::SpeedTrap => &mut self.st,
        }
    }

    pub fn set(&mut self, trap: SpeedTrap, value: Option<f64>) {
        *self.slot(trap) = value;
    }

    /// Present readings, in trap order.
    pub fn readings(&self) -> impl Iterator<Item = (SpeedTrap, f64)> + '_ {
        SpeedTrap::ALL
            .into_iter()
            .filter_map(move |trap| self.get(trap).map(|v| (trap, v)))
    }
}

/// One driver's timing, position and tire data for one lap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapRecord {
    pub driver: String,
    pub lap_number: u32,
    pub lap_time: Option<f64>,
    pub sectors: [Option<f64>; 3],
    pub speed_traps: SpeedTraps,
    pub position: u32,
    pub compound: Option<String>,
    pub tire_life: Option<u32>,
    pub pit_in: bool,
    pub pit_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    /// Seconds since session start.
    pub timestamp: f64,
    pub speed: f64,
    pub throttle: f64,
    pub brake: f64,
    pub gear: u8,
    pub rpm: f64,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    Flag,
    Incident,
    TrackLimits,
    Other,
}

impl MessageCategory {
    /// Accepts the normalized names plus the provider's native labels
    /// (`CarEvent`, `SafetyCar`, `Drs`, ...). Unrecognized labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "flag" => MessageCategory::Flag,
            "incident" | "collision" | "carevent" => MessageCategory::Incident,
            "tracklimits" => MessageCategory::TrackLimits,
            _ => MessageCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceControlMessage {
    pub lap: Option<u32>,
    pub category: MessageCategory,
    pub message: String,
    pub flag: Option<String>,
    /// Car the message is addressed to, when the provider tags one.
    pub racing_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackStatus {
    Clear,
    Yellow,
    SafetyCar,
    Red,
}

impl TrackStatus {
    /// Accepts the normalized names and the provider's numeric status codes.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "clear" | "green" | "1" => Some(TrackStatus::Clear),
            "yellow" | "2" => Some(TrackStatus::Yellow),
            "safety-car" | "safety_car" | "sc" | "vsc" | "4" | "6" | "7" => {
                Some(TrackStatus::SafetyCar)
            }
            "red" | "5" => Some(TrackStatus::Red),
            _ => None,
        }
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackStatus::Clear => "clear",
            TrackStatus::Yellow => "yellow",
            TrackStatus::SafetyCar => "safety-car",
            TrackStatus::Red => "red",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStatusPeriod {
    pub status: TrackStatus,
    pub lap_start: u32,
    /// `None` when the period runs to the end of the session.
    pub lap_end: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSample {
    pub timestamp: f64,
    pub air_temp: f64,
    pub track_temp: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Driver {
    pub code: String,
    pub full_name: String,
    pub team: String,
    pub car_number: u32,
    pub classified_position: Option<u32>,
}
