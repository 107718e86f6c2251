//! Fixed grammar for reading race-control message text.
//!
//! Every pattern here is part of [`GRAMMAR_VERSION`]; changing what a pattern
//! accepts means bumping the version. Text that does not match yields `None`.

use crate::session::Roster;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const GRAMMAR_VERSION: u32 = 1;

pub const INCIDENT_KEYWORDS: &[&str] =
    &["INCIDENT", "CRASH", "COLLISION", "OFF TRACK", "SPIN", "CONTACT"];
pub const COLLISION_KEYWORDS: &[&str] = &["COLLISION"];
pub const TRACK_LIMITS_KEYWORDS: &[&str] = &["TRACK LIMITS", "DELETED"];
pub const YELLOW_KEYWORDS: &[&str] = &["YELLOW"];

fn car_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bCARS?\s+(\d{1,2}(?:\s*(?:,|AND|&)\s*\d{1,2})*)\b").expect("car list regex")
    })
}

fn tagged_car_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})\s*\(([A-Z]{3})\)").expect("tagged car regex"))
}

fn code_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{3}\b").expect("code token regex"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}").expect("number regex"))
}

fn turn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bTURNS?\s+(\d{1,2})\b").expect("turn regex"))
}

fn sector_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bSECTOR\s+(\d{1,2})\b").expect("sector regex"))
}

fn deleted_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bTIME\s+(?:(\d{1,2}):)?(\d{1,2}\.\d{1,3})\b").expect("deleted time regex")
    })
}

fn normalize(text: &str) -> String {
    text.to_ascii_uppercase()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let text = normalize(text);
    keywords.iter().any(|k| text.contains(k))
}

pub fn mentions_incident(text: &str) -> bool {
    contains_any(text, INCIDENT_KEYWORDS)
}

pub fn mentions_collision(text: &str) -> bool {
    contains_any(text, COLLISION_KEYWORDS)
}

pub fn mentions_track_limits(text: &str) -> bool {
    contains_any(text, TRACK_LIMITS_KEYWORDS)
}

pub fn mentions_yellow(text: &str) -> bool {
    contains_any(text, YELLOW_KEYWORDS)
}

/// Resolves every roster driver the message names, in order of first
/// appearance. Car numbers (`CAR 1`, `CARS 4 AND 81`, `44 (HAM)`) and bare
/// three-letter codes are both recognized; anything not on the roster is
/// ignored.
pub fn resolve_drivers(text: &str, roster: &Roster) -> Vec<String> {
    let text = normalize(text);
    let mut hits: Vec<(usize, String)> = Vec::new();

    for caps in car_list_regex().captures_iter(&text) {
        if let Some(list) = caps.get(1) {
            for number in number_regex().find_iter(list.as_str()) {
                let code = number
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(|n| roster.code_for_number(n));
                if let Some(code) = code {
                    hits.push((list.start() + number.start(), code.to_string()));
                }
            }
        }
    }

    for caps in tagged_car_regex().captures_iter(&text) {
        let (Some(number), Some(code)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let by_number = number
            .as_str()
            .parse::<u32>()
            .ok()
            .and_then(|n| roster.code_for_number(n));
        let resolved = by_number.or_else(|| roster.contains(code.as_str()).then_some(code.as_str()));
        if let Some(resolved) = resolved {
            hits.push((number.start(), resolved.to_string()));
        }
    }

    for token in code_token_regex().find_iter(&text) {
        if roster.contains(token.as_str()) {
            hits.push((token.start(), token.as_str().to_string()));
        }
    }

    hits.sort_by_key(|(offset, _)| *offset);
    let mut drivers: Vec<String> = Vec::new();
    for (_, code) in hits {
        if !drivers.contains(&code) {
            drivers.push(code);
        }
    }
    drivers
}

pub fn parse_turn(text: &str) -> Option<u32> {
    turn_regex()
        .captures(&normalize(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Marshalling sector, from `YELLOW IN TRACK SECTOR 7`.
pub fn parse_sector(text: &str) -> Option<u32> {
    sector_regex()
        .captures(&normalize(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Deleted lap time in seconds, from `TIME 1:18.562` or `TIME 78.562`.
pub fn parse_deleted_time(text: &str) -> Option<f64> {
    let text = normalize(text);
    let caps = deleted_time_regex().captures(&text)?;
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: f64 = match caps.get(1) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0.0,
    };
    Some(minutes * 60.0 + seconds)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StewardAction {
    NoFurtherAction,
    UnderInvestigation,
    InvestigatedAfterRace,
    LapTimeDeleted,
    Noted,
    Unknown,
}

impl StewardAction {
    pub fn parse(text: &str) -> Self {
        let text = normalize(text);
        if text.contains("NO FURTHER ACTION") {
            StewardAction::NoFurtherAction
        } else if text.contains("UNDER INVESTIGATION") {
            StewardAction::UnderInvestigation
        } else if text.contains("WILL BE INVESTIGATED") {
            StewardAction::InvestigatedAfterRace
        } else if text.contains("DELETED") {
            StewardAction::LapTimeDeleted
        } else if text.contains("NOTED") {
            StewardAction::Noted
        } else {
            StewardAction::Unknown
        }
    }
}
