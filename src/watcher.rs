use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Duration;

use colored::Colorize;

use crate::schedule::ScheduleSource;
use crate::viewer::Viewer;
use crate::{now_ms, MatchRecord, POLL_INTERVAL_SECS};

/// Why the watch loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The schedule has no current or future match.
    ScheduleExhausted,
    /// The shutdown flag was raised (Ctrl-C).
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
enum WatchState {
    WaitingForMatch,
    WaitingForLive(MatchRecord),
    Watching { end_ts: i64 },
}

/// Outcome of a single poll step.
#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Continue,
    ScheduleExhausted,
}

/// The polling state machine: wait for a match, wait for it to go live,
/// keep the viewer open until the match ends, then start over. One `tick`
/// is one poll; `run` drives ticks at the fixed interval.
pub struct Watcher<S: ScheduleSource, V: Viewer> {
    source: S,
    viewer: V,
    state: WatchState,
}

impl<S: ScheduleSource, V: Viewer> Watcher<S, V> {
    pub fn new(source: S, viewer: V) -> Self {
        Self {
            source,
            viewer,
            state: WatchState::WaitingForMatch,
        }
    }

    /// Loop until the schedule runs out of matches or the shutdown flag is
    /// raised. Either way the viewer is terminated before returning.
    pub fn run(&mut self, shutdown: &AtomicBool) -> ExitReason {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                self.cleanup();
                return ExitReason::Interrupted;
            }

            if self.tick(now_ms()) == Tick::ScheduleExhausted {
                self.cleanup();
                return ExitReason::ScheduleExhausted;
            }

            if !self.sleep_interval(shutdown) {
                self.cleanup();
                return ExitReason::Interrupted;
            }
        }
    }

    fn tick(&mut self, now_ms: i64) -> Tick {
        match self.state.clone() {
            WatchState::WaitingForMatch => match self.source.poll(now_ms) {
                Ok(Some(record)) => {
                    record.announce();
                    if record.is_live(now_ms) {
                        self.start_watching(record);
                    } else {
                        println!(
                            "{}",
                            "I'm going to wait for the match to go live...".yellow()
                        );
                        self.state = WatchState::WaitingForLive(record);
                    }
                    Tick::Continue
                }
                Ok(None) => {
                    println!(
                        "{}",
                        "The schedule has no current or future match. I'm done here.".green()
                    );
                    Tick::ScheduleExhausted
                }
                Err(e) => {
                    println!(
                        "{}: {e}",
                        "I couldn't fetch the schedule, I'll retry next tick".yellow()
                    );
                    Tick::Continue
                }
            },
            WatchState::WaitingForLive(_) => {
                match self.source.poll(now_ms) {
                    Ok(Some(record)) if record.is_live(now_ms) => self.start_watching(record),
                    Ok(Some(record)) => self.state = WatchState::WaitingForLive(record),
                    Ok(None) => {
                        println!(
                            "{}",
                            "The match dropped off the schedule, starting over".yellow()
                        );
                        self.state = WatchState::WaitingForMatch;
                    }
                    Err(e) => {
                        println!(
                            "{}: {e}",
                            "I couldn't refresh the schedule, I'll retry next tick".yellow()
                        );
                    }
                }
                Tick::Continue
            }
            WatchState::Watching { mut end_ts } => {
                // A successful poll that still sees the current match
                // refreshes the end time. Anything else, including a
                // malformed payload, means "assume the match has not ended".
                match self.source.poll(now_ms) {
                    Ok(Some(record)) if record.start_ts <= now_ms => end_ts = record.end_ts,
                    Ok(_) => {}
                    Err(e) => {
                        println!(
                            "{}: {e}",
                            "Schedule refresh failed mid-match, I'll keep watching".yellow()
                        );
                    }
                }

                if now_ms >= end_ts {
                    self.stop_watching();
                    self.state = WatchState::WaitingForMatch;
                } else {
                    self.state = WatchState::Watching { end_ts };
                }
                Tick::Continue
            }
        }
    }

    fn start_watching(&mut self, record: MatchRecord) {
        println!(
            "{} {}",
            "The match is live! Opening the stream at".green(),
            record.watch_url.white()
        );
        match self.viewer.launch(&record.watch_url) {
            Ok(()) => self.state = WatchState::Watching {
                end_ts: record.end_ts,
            },
            Err(e) => {
                println!(
                    "{}: {e}",
                    "I couldn't launch the viewer, abandoning this watch attempt".red()
                );
                self.state = WatchState::WaitingForMatch;
            }
        }
    }

    fn stop_watching(&mut self) {
        println!("{}", "The match is over, closing the viewer".green());
        if let Err(e) = self.viewer.terminate() {
            println!(
                "{}: {e}",
                "I couldn't terminate the viewer cleanly".yellow()
            );
        }
    }

    /// Sleep the poll interval in one-second slices so Ctrl-C stays
    /// responsive. Returns false when the shutdown flag was raised.
    fn sleep_interval(&self, shutdown: &AtomicBool) -> bool {
        for _ in 0..POLL_INTERVAL_SECS {
            if shutdown.load(Ordering::SeqCst) {
                return false;
            }
            sleep(Duration::from_secs(1));
        }
        true
    }

    fn cleanup(&mut self) {
        if self.viewer.is_running() {
            if let Err(e) = self.viewer.terminate() {
                println!(
                    "{}: {e}",
                    "I couldn't terminate the viewer on shutdown".yellow()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::{Result, WatcherError};
    use crate::{LiveStatus, MatchRecord};

    fn record(start: i64, end: i64, status: LiveStatus) -> MatchRecord {
        MatchRecord {
            start_ts: start,
            end_ts: end,
            competitors: ("Fusion".to_string(), "Dynasty".to_string()),
            status,
            watch_url: "https://stream.test/owl".to_string(),
        }
    }

    fn parse_err() -> WatcherError {
        WatcherError::Parse("boom".to_string())
    }

    struct FakeSource {
        responses: VecDeque<Result<Option<MatchRecord>>>,
    }

    impl FakeSource {
        fn new(responses: Vec<Result<Option<MatchRecord>>>) -> Self {
            Self {
                responses: responses.into(),
            }
        }
    }

    impl ScheduleSource for FakeSource {
        fn poll(&mut self, _now_ms: i64) -> Result<Option<MatchRecord>> {
            self.responses.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct FakeViewer {
        launches: Vec<String>,
        terminations: usize,
        running: bool,
        fail_launch: bool,
    }

    impl Viewer for FakeViewer {
        fn launch(&mut self, url: &str) -> Result<()> {
            if self.fail_launch {
                return Err(WatcherError::Process(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no browser on PATH",
                )));
            }
            self.launches.push(url.to_string());
            self.running = true;
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminations += 1;
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    #[test]
    fn full_cycle_launches_then_terminates_after_the_end() {
        let source = FakeSource::new(vec![
            Ok(Some(record(100, 200, LiveStatus::Pending))),
            Ok(Some(record(100, 200, LiveStatus::Live))),
            Ok(Some(record(100, 200, LiveStatus::Live))),
            // After the end the source already offers the next match.
            Ok(Some(record(300, 400, LiveStatus::Pending))),
        ]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        assert_eq!(watcher.tick(50), Tick::Continue);
        assert!(matches!(watcher.state, WatchState::WaitingForLive(_)));

        assert_eq!(watcher.tick(120), Tick::Continue);
        assert_eq!(watcher.viewer.launches, vec!["https://stream.test/owl"]);
        assert_eq!(watcher.state, WatchState::Watching { end_ts: 200 });

        assert_eq!(watcher.tick(150), Tick::Continue);
        assert_eq!(watcher.viewer.terminations, 0);

        assert_eq!(watcher.tick(210), Tick::Continue);
        assert_eq!(watcher.viewer.terminations, 1);
        assert_eq!(watcher.state, WatchState::WaitingForMatch);
    }

    #[test]
    fn viewer_is_never_terminated_before_the_end() {
        let live: Vec<Result<Option<MatchRecord>>> = (0..10)
            .map(|_| Ok(Some(record(100, 1_000, LiveStatus::Live))))
            .collect();
        let mut watcher = Watcher::new(FakeSource::new(live), FakeViewer::default());

        watcher.tick(100);
        for now in (150..1_000).step_by(100) {
            watcher.tick(now);
            assert_eq!(watcher.viewer.terminations, 0);
        }
        watcher.tick(1_000);
        assert_eq!(watcher.viewer.terminations, 1);
    }

    #[test]
    fn no_future_match_stops_cleanly() {
        let mut watcher = Watcher::new(FakeSource::new(vec![Ok(None)]), FakeViewer::default());
        assert_eq!(watcher.tick(0), Tick::ScheduleExhausted);
        assert!(watcher.viewer.launches.is_empty());
    }

    #[test]
    fn poll_errors_while_waiting_are_retried() {
        let source = FakeSource::new(vec![
            Err(parse_err()),
            Ok(Some(record(100, 200, LiveStatus::Pending))),
            Err(parse_err()),
        ]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        assert_eq!(watcher.tick(10), Tick::Continue);
        assert_eq!(watcher.state, WatchState::WaitingForMatch);

        assert_eq!(watcher.tick(20), Tick::Continue);
        assert!(matches!(watcher.state, WatchState::WaitingForLive(_)));

        // A failed refresh keeps waiting on the match we already hold.
        assert_eq!(watcher.tick(30), Tick::Continue);
        assert!(matches!(watcher.state, WatchState::WaitingForLive(_)));
    }

    #[test]
    fn malformed_poll_mid_watch_keeps_the_viewer_running() {
        let source = FakeSource::new(vec![
            Ok(Some(record(100, 1_000, LiveStatus::Live))),
            Err(parse_err()),
            Err(parse_err()),
        ]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        watcher.tick(150);
        assert_eq!(watcher.state, WatchState::Watching { end_ts: 1_000 });

        watcher.tick(500);
        assert_eq!(watcher.viewer.terminations, 0);
        assert_eq!(watcher.state, WatchState::Watching { end_ts: 1_000 });

        // The conservative rule still lets the clock end the match.
        watcher.tick(1_200);
        assert_eq!(watcher.viewer.terminations, 1);
        assert_eq!(watcher.state, WatchState::WaitingForMatch);
    }

    #[test]
    fn refresh_extends_the_end_time_of_a_running_match() {
        let source = FakeSource::new(vec![
            Ok(Some(record(100, 1_000, LiveStatus::Live))),
            Ok(Some(record(100, 2_000, LiveStatus::Live))),
            Ok(None),
        ]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        watcher.tick(150);
        // The match is running long; the refreshed end applies.
        watcher.tick(1_100);
        assert_eq!(watcher.viewer.terminations, 0);
        assert_eq!(watcher.state, WatchState::Watching { end_ts: 2_000 });
    }

    #[test]
    fn next_match_offered_after_the_end_does_not_extend_the_window() {
        let source = FakeSource::new(vec![
            Ok(Some(record(100, 200, LiveStatus::Live))),
            Ok(Some(record(5_000, 6_000, LiveStatus::Pending))),
        ]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        watcher.tick(150);
        watcher.tick(250);
        assert_eq!(watcher.viewer.terminations, 1);
        assert_eq!(watcher.state, WatchState::WaitingForMatch);
    }

    #[test]
    fn launch_failure_falls_back_to_waiting_for_a_match() {
        let source = FakeSource::new(vec![Ok(Some(record(100, 200, LiveStatus::Live)))]);
        let viewer = FakeViewer {
            fail_launch: true,
            ..FakeViewer::default()
        };
        let mut watcher = Watcher::new(source, viewer);

        assert_eq!(watcher.tick(150), Tick::Continue);
        assert!(watcher.viewer.launches.is_empty());
        assert_eq!(watcher.state, WatchState::WaitingForMatch);
    }

    #[test]
    fn shutdown_flag_terminates_a_running_viewer() {
        let source = FakeSource::new(vec![Ok(Some(record(100, 1_000, LiveStatus::Live)))]);
        let mut watcher = Watcher::new(source, FakeViewer::default());

        watcher.tick(150);
        assert!(watcher.viewer.is_running());

        let shutdown = AtomicBool::new(true);
        assert_eq!(watcher.run(&shutdown), ExitReason::Interrupted);
        assert!(!watcher.viewer.is_running());
        assert_eq!(watcher.viewer.terminations, 1);
    }
}
