use chrono::{DateTime, Utc};
use colored::Colorize;

pub mod error;
pub mod schedule;
pub mod viewer;
pub mod watcher;

/// The schedule API does not carry a per-match stream URL, so every match is
/// watched on the league channel.
pub const DEFAULT_WATCH_URL: &str = "https://www.twitch.tv/overwatchleague";

/// Fixed filename the raw schedule payload is written to when enabled.
pub const RAW_SCHEDULE_FILE: &str = "owl-schedule.json";

/// Seconds between schedule polls, in every state of the watch loop.
pub const POLL_INTERVAL_SECS: u64 = 60;

/// State of a match relative to its scheduled window, as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Pending,
    Live,
    Ended,
    Unknown,
}

impl LiveStatus {
    pub fn from_api(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return LiveStatus::Unknown;
        };
        if status.eq_ignore_ascii_case("IN_PROGRESS") || status.eq_ignore_ascii_case("LIVE") {
            LiveStatus::Live
        } else if status.eq_ignore_ascii_case("PENDING") || status.eq_ignore_ascii_case("UPCOMING")
        {
            LiveStatus::Pending
        } else if status.eq_ignore_ascii_case("CONCLUDED") || status.eq_ignore_ascii_case("ENDED") {
            LiveStatus::Ended
        } else {
            LiveStatus::Unknown
        }
    }
}

/// Normalized representation of one scheduled match, built fresh on every
/// poll and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    /// Scheduled start, milliseconds since the epoch.
    pub start_ts: i64,
    /// Scheduled end, milliseconds since the epoch.
    pub end_ts: i64,
    pub competitors: (String, String),
    pub status: LiveStatus,
    pub watch_url: String,
}

impl MatchRecord {
    /// Effective liveness: an explicit API status wins, an Unknown status
    /// falls back to the scheduled window.
    pub fn is_live(&self, now_ms: i64) -> bool {
        match self.status {
            LiveStatus::Live => true,
            LiveStatus::Unknown => self.start_ts <= now_ms && now_ms < self.end_ts,
            LiveStatus::Pending | LiveStatus::Ended => false,
        }
    }

    pub fn has_ended(&self, now_ms: i64) -> bool {
        now_ms >= self.end_ts
    }

    pub fn announce(&self) {
        println!("{}", "=================================================".blue());
        println!("{}", "| Next up:".blue());
        println!(
            "{} {} {} {}",
            "|".blue(),
            self.competitors.0.white().bold(),
            "vs.".yellow(),
            self.competitors.1.white().bold()
        );
        println!(
            "{} From {} to {}",
            "|".blue(),
            fmt_utc(self.start_ts).green(),
            fmt_utc(self.end_ts).green()
        );
        println!("{}", "=================================================".blue());
    }
}

/// Current time in milliseconds since the epoch. Only the loop edge calls
/// this; everything that decides anything takes `now_ms` as a parameter.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn fmt_utc(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{ms}ms"),
    }
}
