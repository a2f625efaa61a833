use std::time::Duration;

use colored::Colorize;
use serde::Deserialize;

use crate::error::{Result, WatcherError};
use crate::{LiveStatus, MatchRecord, DEFAULT_WATCH_URL, RAW_SCHEDULE_FILE};

/// Anything the watch loop can poll for the match of interest. `Ok(None)`
/// means the source genuinely has no current or future match, which is
/// different from a fetch or parse failure.
pub trait ScheduleSource {
    fn poll(&mut self, now_ms: i64) -> Result<Option<MatchRecord>>;
}

#[derive(Debug, Deserialize)]
struct SchedulePayload {
    data: ScheduleData,
}

#[derive(Debug, Deserialize)]
struct ScheduleData {
    stages: Vec<Stage>,
}

#[derive(Debug, Deserialize)]
struct Stage {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
struct ApiMatch {
    #[serde(rename = "startDateTS")]
    start_date_ts: Option<i64>,
    #[serde(rename = "endDateTS")]
    end_date_ts: Option<i64>,
    status: Option<String>,
    // Competitor slots are null while a bracket spot is still to be decided.
    #[serde(default)]
    competitors: Vec<Option<Competitor>>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    name: String,
}

/// Fetches the schedule payload over HTTP and normalizes it. No caching and
/// no internal retries; the watch loop owns the retry semantics.
pub struct ScheduleClient {
    http: reqwest::blocking::Client,
    api_url: String,
    write_raw: bool,
}

impl ScheduleClient {
    pub fn new(api_url: impl Into<String>, write_raw: bool) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            write_raw,
        })
    }

    fn fetch_payload(&self) -> Result<String> {
        let text = self
            .http
            .get(&self.api_url)
            .header("Accept", "application/json")
            .send()?
            .text()?;

        if self.write_raw {
            // Diagnostics only; never read back and never fatal.
            if let Err(e) = std::fs::write(RAW_SCHEDULE_FILE, &text) {
                println!(
                    "{}: {e}",
                    "I couldn't write the raw schedule payload".yellow()
                );
            }
        }

        Ok(text)
    }
}

impl ScheduleSource for ScheduleClient {
    fn poll(&mut self, now_ms: i64) -> Result<Option<MatchRecord>> {
        let text = self.fetch_payload()?;
        parse_and_select(&text, now_ms)
    }
}

/// Parse a raw payload and pick the match of interest: the match whose window
/// contains `now_ms` wins, otherwise the earliest match starting after it.
pub fn parse_and_select(text: &str, now_ms: i64) -> Result<Option<MatchRecord>> {
    let payload: SchedulePayload = serde_json::from_str(text)
        .map_err(|e| WatcherError::Parse(format!("schedule payload: {e}")))?;

    let matches: Vec<&ApiMatch> = payload
        .data
        .stages
        .iter()
        .flat_map(|stage| stage.matches.iter())
        .collect();

    let picked = match matches.iter().find(|m| within_window(m, now_ms)) {
        Some(current) => Some(*current),
        None => matches
            .iter()
            .filter(|m| m.start_date_ts.is_some_and(|start| start > now_ms))
            .min_by_key(|m| m.start_date_ts)
            .copied(),
    };

    picked.map(to_record).transpose()
}

fn within_window(m: &ApiMatch, now_ms: i64) -> bool {
    matches!(
        (m.start_date_ts, m.end_date_ts),
        (Some(start), Some(end)) if start <= now_ms && now_ms < end
    )
}

fn to_record(m: &ApiMatch) -> Result<MatchRecord> {
    let start_ts = m
        .start_date_ts
        .ok_or_else(|| WatcherError::Parse("match is missing startDateTS".to_string()))?;
    let end_ts = m
        .end_date_ts
        .ok_or_else(|| WatcherError::Parse("match is missing endDateTS".to_string()))?;
    if start_ts > end_ts {
        return Err(WatcherError::Parse(format!(
            "match window is inverted: {start_ts} > {end_ts}"
        )));
    }

    let mut names = m.competitors.iter().flatten().map(|c| c.name.clone());
    let (Some(first), Some(second)) = (names.next(), names.next()) else {
        return Err(WatcherError::Parse(
            "match is missing competitors".to_string(),
        ));
    };

    Ok(MatchRecord {
        start_ts,
        end_ts,
        competitors: (first, second),
        status: LiveStatus::from_api(m.status.as_deref()),
        watch_url: DEFAULT_WATCH_URL.to_string(),
    })
}
