//! Undecoded session tables as delivered by the Session Store.
//!
//! Every column is optional here so that a missing field surfaces as a
//! [`SchemaError`](crate::SchemaError) naming the table and field instead of
//! an opaque decode failure.

use serde::{Deserialize, Serialize};

/// Car numbers arrive either as JSON numbers or as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CarNumber {
    Int(i64),
    Text(String),
}

impl CarNumber {
    pub fn parse(&self) -> Option<u32> {
        match self {
            CarNumber::Int(n) => u32::try_from(*n).ok().filter(|n| *n > 0),
            CarNumber::Text(s) => s.trim().parse::<u32>().ok().filter(|n| *n > 0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSession {
    pub laps: Vec<RawLap>,
    pub telemetry: Vec<RawTelemetryFrame>,
    pub race_control: Vec<RawRaceControlMessage>,
    pub track_status: Vec<RawTrackStatus>,
    pub weather: Vec<RawWeatherSample>,
    pub drivers: Vec<RawDriver>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLap {
    pub driver: Option<String>,
    pub lap_number: Option<i64>,
    pub lap_time: Option<f64>,
    pub sector1: Option<f64>,
    pub sector2: Option<f64>,
    pub sector3: Option<f64>,
    #[serde(rename = "speed_I1", alias = "speed_i1")]
    pub speed_i1: Option<f64>,
    #[serde(rename = "speed_I2", alias = "speed_i2")]
    pub speed_i2: Option<f64>,
    #[serde(rename = "speed_FL", alias = "speed_fl")]
    pub speed_fl: Option<f64>,
    #[serde(rename = "speed_ST", alias = "speed_st")]
    pub speed_st: Option<f64>,
    pub position: Option<i64>,
    pub compound: Option<String>,
    pub tire_life: Option<i64>,
    pub pit_in: Option<bool>,
    pub pit_out: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTelemetryFrame {
    pub driver: Option<String>,
    pub lap_number: Option<i64>,
    pub timestamp: Option<f64>,
    pub speed: Option<f64>,
    pub throttle: Option<f64>,
    pub brake: Option<f64>,
    pub gear: Option<i64>,
    pub rpm: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRaceControlMessage {
    pub lap_number: Option<i64>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub flag: Option<String>,
    pub racing_number: Option<CarNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrackStatus {
    pub status: Option<String>,
    pub lap_start: Option<i64>,
    pub lap_end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWeatherSample {
    pub timestamp: Option<f64>,
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rainfall: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDriver {
    pub code: Option<String>,
    pub full_name: Option<String>,
    pub team: Option<String>,
    pub car_number: Option<CarNumber>,
    /// Official classification, when the provider has published it.
    pub classified_position: Option<i64>,
}
