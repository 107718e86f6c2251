//! The analysis document handed to downstream consumers, and its plain-text
//! rendering.

use crate::config::AnalysisConfig;
use crate::error::DetectionIssue;
use crate::model::{Detection, Incident, PositionChange, TrackLimitsViolation};
use crate::overview::{self, PitStop, RaceOverview, WeatherSummary, YellowFlag};
use crate::patterns::GRAMMAR_VERSION;
use crate::position_changes::{self, PositionChangeTally};
use crate::ranking::CommentarySegment;
use crate::session::Session;
use serde::Serialize;
use std::fmt;

const SUMMARY_TOP_CHANGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub position_changes: PositionChangeTally,
    pub incidents: usize,
    pub collisions: usize,
    pub track_limits_violations: usize,
    pub yellow_flags: usize,
    pub pit_stops: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub telemetry_unavailable: usize,
    pub parse_failures: usize,
    pub unplaced: usize,
    /// Entities emitted with at least one field left unset.
    pub incomplete_entries: usize,
    pub issues: Vec<DetectionIssue>,
}

impl Diagnostics {
    fn collect(
        incidents: &Detection<Incident>,
        changes: &Detection<PositionChange>,
        violations: &Detection<TrackLimitsViolation>,
    ) -> Self {
        let issues: Vec<DetectionIssue> = incidents
            .issues
            .iter()
            .chain(&changes.issues)
            .chain(&violations.issues)
            .cloned()
            .collect();
        let mut diagnostics = Diagnostics::default();
        for issue in &issues {
            match issue {
                DetectionIssue::TelemetryUnavailable { .. } => diagnostics.telemetry_unavailable += 1,
                DetectionIssue::Parse { .. } => diagnostics.parse_failures += 1,
                DetectionIssue::Unplaced { .. } => diagnostics.unplaced += 1,
            }
        }
        diagnostics.incomplete_entries = incidents
            .items
            .iter()
            .filter(|i| !i.telemetry_available || i.lap.is_none() || i.drivers.is_empty())
            .count()
            + violations
                .items
                .iter()
                .filter(|v| v.driver.is_none() || v.turn.is_none() || v.lap.is_none() || v.lap_time.is_none())
                .count();
        diagnostics.issues = issues;
        diagnostics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub grammar_version: u32,
    pub config: AnalysisConfig,
    pub race_overview: RaceOverview,
    pub incidents: Vec<Incident>,
    pub position_changes: Vec<PositionChange>,
    pub track_limits_violations: Vec<TrackLimitsViolation>,
    pub pit_stops: Vec<PitStop>,
    pub yellow_flags: Vec<YellowFlag>,
    pub weather_summary: Option<WeatherSummary>,
    pub statistics: Statistics,
    pub commentary_segments: Vec<CommentarySegment>,
    pub diagnostics: Diagnostics,
}

/// Packages detector and ranker output. Nothing here re-runs detection.
pub fn assemble(
    session: &Session,
    config: AnalysisConfig,
    incidents: Detection<Incident>,
    position_changes: Detection<PositionChange>,
    track_limits: Detection<TrackLimitsViolation>,
    commentary_segments: Vec<CommentarySegment>,
) -> AnalysisReport {
    let diagnostics = Diagnostics::collect(&incidents, &position_changes, &track_limits);
    let pit_stops = overview::pit_stops(session);
    let yellow_flags = overview::yellow_flags(session);
    let statistics = Statistics {
        position_changes: position_changes::tally(session),
        incidents: incidents.items.len(),
        collisions: incidents.items.iter().filter(|i| i.collision).count(),
        track_limits_violations: track_limits.items.len(),
        yellow_flags: yellow_flags.len(),
        pit_stops: pit_stops.len(),
    };

    AnalysisReport {
        grammar_version: GRAMMAR_VERSION,
        config,
        race_overview: overview::race_overview(session),
        incidents: incidents.items,
        position_changes: position_changes.items,
        track_limits_violations: track_limits.items,
        pit_stops,
        yellow_flags,
        weather_summary: overview::weather_summary(session),
        statistics,
        commentary_segments,
        diagnostics,
    }
}

/// Human-readable report for logs and the `/analyze/summary` route.
pub fn render_summary(report: &AnalysisReport) -> String {
    Summary(report).to_string()
}

struct Summary<'a>(&'a AnalysisReport);

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        let o = &r.race_overview;
        writeln!(f, "RACE ANALYSIS: {} ({})", o.race, o.session)?;
        writeln!(f, "{}", "=".repeat(60))?;
        match &o.winner {
            Some(w) => writeln!(f, "Winner: {} ({}, {})", w.full_name, w.code, w.team)?,
            None => writeln!(f, "Winner: n/a")?,
        }
        let podium: Vec<String> = o.podium.iter().map(|d| format!("P{} {}", d.position, d.code)).collect();
        writeln!(f, "Podium: {}", podium.join(", "))?;
        writeln!(
            f,
            "Laps: {}  Drivers: {}  Lap records: {}",
            o.total_laps, o.total_drivers, o.total_lap_records
        )?;

        if let Some(w) = &r.weather_summary {
            writeln!(
                f,
                "Weather: air {:.1}-{:.1} C, track {:.1}-{:.1} C, rain: {}",
                w.air_temp.min,
                w.air_temp.max,
                w.track_temp.min,
                w.track_temp.max,
                if w.rainfall { "yes" } else { "no" }
            )?;
        }

        writeln!(f)?;
        writeln!(f, "INCIDENTS ({})", r.incidents.len())?;
        for incident in &r.incidents {
            writeln!(
                f,
                "  Lap {}: {} [{}]",
                opt(incident.lap),
                incident.message,
                incident.drivers.join(", ")
            )?;
            for summary in &incident.summaries {
                for flag in &summary.anomalies {
                    writeln!(
                        f,
                        "    {} {} lap {}: {:+.2} (threshold {})",
                        summary.driver, flag.metric, flag.lap, flag.delta, flag.threshold
                    )?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "POSITION CHANGES ({})", r.position_changes.len())?;
        for c in r.position_changes.iter().take(SUMMARY_TOP_CHANGES) {
            writeln!(
                f,
                "  Lap {}: {} P{} -> P{} ({:+}){}",
                c.lap,
                c.driver,
                c.position_before,
                c.position_after,
                c.delta,
                if c.pit_stop { " pit" } else { "" }
            )?;
        }

        writeln!(f)?;
        writeln!(f, "TRACK LIMITS ({})", r.track_limits_violations.len())?;
        for v in &r.track_limits_violations {
            writeln!(
                f,
                "  Lap {}: {} turn {} deleted {}",
                opt(v.lap),
                v.driver.as_deref().unwrap_or("?"),
                opt(v.turn),
                opt(v.deleted_lap_time.map(|t| format!("{t:.3}s")))
            )?;
        }

        writeln!(f)?;
        writeln!(f, "SEGMENTS ({})", r.commentary_segments.len())?;
        for (rank, s) in r.commentary_segments.iter().enumerate() {
            writeln!(f, "  {:>2}. [P{}] {}", rank + 1, s.priority, s.title)?;
        }

        let d = &r.diagnostics;
        writeln!(f)?;
        write!(
            f,
            "Diagnostics: {} telemetry unavailable, {} parse failures, {} unplaced, {} incomplete",
            d.telemetry_unavailable, d.parse_failures, d.unplaced, d.incomplete_entries
        )
    }
}
