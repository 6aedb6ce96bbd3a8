use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::stations;
use crate::strip::StationDisplay;
use crate::tfl;

pub const DEFAULT_LINE: &str = "central";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> StopToken {
        return StopToken::default();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        return self.stopped.load(Ordering::SeqCst);
    }

    /// Sleeps for `duration`, returning early (with `true`) once stopped.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(std::cmp::min(STOP_CHECK_INTERVAL, deadline - now));
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct CycleSummary {
    pub arrivals: usize,
    /// Positions lit during the cycle, in the order they were lit.
    pub lit: Vec<usize>,
}

impl CycleSummary {
    pub fn final_position(&self) -> Option<usize> {
        return self.lit.last().copied();
    }
}

pub struct PollLoop<D: StationDisplay> {
    client: tfl::TflClient,
    positions: stations::StationPositionMap,
    display: D,
    line: String,
    watch_station: Option<String>,
    interval: Duration,
}

impl<D: StationDisplay> PollLoop<D> {
    pub fn new(client: tfl::TflClient, positions: stations::StationPositionMap, display: D) -> PollLoop<D> {
        return PollLoop{
            client: client,
            positions: positions,
            display: display,
            line: DEFAULT_LINE.to_string(),
            watch_station: None,
            interval: DEFAULT_POLL_INTERVAL,
        };
    }

    pub fn with_line(mut self, line: &str) -> PollLoop<D> {
        self.line = line.to_string();
        return self;
    }

    pub fn with_watch_station(mut self, station: Option<String>) -> PollLoop<D> {
        self.watch_station = station;
        return self;
    }

    pub fn with_interval(mut self, interval: Duration) -> PollLoop<D> {
        self.interval = interval;
        return self;
    }

    pub fn display(&self) -> &D {
        return &self.display;
    }

    pub fn display_mut(&mut self) -> &mut D {
        return &mut self.display;
    }

    // Every matching arrival lights its LED in turn and light_up clears the
    // strip first, so the last match in feed order is what stays lit.
    pub fn one_iteration(&mut self) -> CycleSummary {
        let arrivals = self.client.get_arrivals(&self.line);

        if let Some(ref station) = self.watch_station {
            for arrival in stations::filter_by_station(&arrivals, station) {
                info!("{}", arrival.summary());
            }
        }

        let mut lit = vec![];
        for arrival in &arrivals {
            let position = match self.positions.position(&arrival.station_name) {
                Some(position) => position,
                None => continue,
            };
            match self.display.light_up(position) {
                Ok(_) => lit.push(position),
                Err(err) => error!("Error lighting {} at {}: {:#}", arrival.station_name, position, err),
            }
        }

        debug!("{} arrivals on the {} line, lit {:?}", arrivals.len(), self.line, lit);

        return CycleSummary{
            arrivals: arrivals.len(),
            lit: lit,
        };
    }

    /// Polls until `stop` fires. Returns the number of completed cycles.
    pub fn run(&mut self, stop: &StopToken) -> usize {
        info!("Polling the {} line every {:?} ({} stations mapped onto {} LEDs)",
              self.line, self.interval, self.positions.len(), self.display.num_positions());

        let mut cycles = 0;
        while !stop.is_stopped() {
            let summary = self.one_iteration();
            cycles += 1;
            if let Some(position) = summary.final_position() {
                info!("Train nearest position {}", position);
            }

            if stop.wait(self.interval) {
                break;
            }
        }

        info!("Stopped after {} cycles", cycles);
        return cycles;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::result;
    use crate::stations::StationPositionMap;
    use crate::strip::{LedStrip, MemoryWriter};
    use crate::tfl::TflClient;

    fn poll_loop(fetch_fn: fn(&str) -> result::TubeResult<String>) -> super::PollLoop<LedStrip<MemoryWriter>> {
        let positions = StationPositionMap::new(50, vec![("Oxford Circus", 5), ("Bank", 10)])
            .expect("map");
        let client = TflClient::new(None).with_fetch_fn(fetch_fn);
        return super::PollLoop::new(client, positions, LedStrip::new(50, MemoryWriter::new()));
    }

    #[test]
    fn single_arrival_lights_its_station() {
        let fake_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(r#"[{"stationName":"Oxford Circus","destinationName":"Epping","timeToStation":120}]"#.to_string());
        };
        let mut poll = poll_loop(fake_fetch_fn);
        let summary = poll.one_iteration();

        assert_eq!(1, summary.arrivals);
        assert_eq!(Some(5), summary.final_position());
        assert_eq!(vec![5], poll.display().state().lit_positions());
    }

    #[test]
    fn last_matching_arrival_wins() {
        let fake_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(r#"[
                {"stationName":"Oxford Circus","destinationName":"Epping","timeToStation":120},
                {"stationName":"Bank","destinationName":"West Ruislip","timeToStation":30}
            ]"#.to_string());
        };
        let mut poll = poll_loop(fake_fetch_fn);
        let summary = poll.one_iteration();

        assert_eq!(vec![5, 10], summary.lit);
        assert_eq!(vec![10], poll.display().state().lit_positions());
        assert_eq!(2, poll.display().writer().frames_written());
    }

    #[test]
    fn missing_config_polls_without_credential() {
        let config = crate::config::load_config("testdata/no_such_config.json");
        assert!(config.is_none());

        let app_key = config.as_ref().and_then(|c| c.app_key()).map(|k| k.to_string());
        let fake_fetch_fn = |url: &str| -> result::TubeResult<String> {
            assert!(!url.contains("app_key"));
            return Ok(r#"[{"stationName":"Bank","destinationName":"Epping","timeToStation":5}]"#.to_string());
        };
        let client = TflClient::new(app_key).with_fetch_fn(fake_fetch_fn);
        let positions = StationPositionMap::with_default_stations(50).expect("map");
        let mut poll = super::PollLoop::new(client, positions, LedStrip::new(50, MemoryWriter::new()));

        assert_eq!(Some(10), poll.one_iteration().final_position());
    }

    #[test]
    fn network_failure_leaves_display_alone() {
        let failing_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Err(result::make_error("connection reset by peer"));
        };
        let mut poll = poll_loop(failing_fetch_fn);
        let summary = poll.one_iteration();

        assert_eq!(super::CycleSummary{arrivals: 0, lit: vec![]}, summary);
        assert_eq!(0, poll.display().writer().frames_written());
        assert!(poll.display().state().lit_positions().is_empty());
    }

    #[test]
    fn unmapped_stations_are_skipped() {
        let fixture_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(std::fs::read_to_string("testdata/arrivals.json")?);
        };
        let mut poll = poll_loop(fixture_fetch_fn)
            .with_watch_station(Some("oxford circus underground station".to_string()));
        let summary = poll.one_iteration();

        // The feed uses full station names, which this map doesn't know.
        assert_eq!(4, summary.arrivals);
        assert!(summary.lit.is_empty());
        assert_eq!(0, poll.display().writer().frames_written());
    }

    #[test]
    fn fixture_feed_lights_in_feed_order() {
        let fixture_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(std::fs::read_to_string("testdata/arrivals.json")?);
        };
        let positions = StationPositionMap::new(50, vec![
            ("Oxford Circus Underground Station", 5),
            ("Bank Underground Station", 10),
        ]).expect("map");
        let client = TflClient::new(None).with_fetch_fn(fixture_fetch_fn);
        let mut poll = super::PollLoop::new(client, positions, LedStrip::new(50, MemoryWriter::new()));
        let summary = poll.one_iteration();

        assert_eq!(vec![5, 10, 5], summary.lit);
        assert_eq!(vec![5], poll.display().state().lit_positions());
    }

    #[test]
    fn display_error_does_not_end_cycle() {
        let fake_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(r#"[
                {"stationName":"Bank","destinationName":"Epping","timeToStation":5},
                {"stationName":"Oxford Circus","destinationName":"Epping","timeToStation":50}
            ]"#.to_string());
        };
        let positions = StationPositionMap::new(50, vec![("Oxford Circus", 5), ("Bank", 10)])
            .expect("map");
        let client = TflClient::new(None).with_fetch_fn(fake_fetch_fn);
        // Strip shorter than the map: Bank's LED doesn't exist.
        let mut poll = super::PollLoop::new(client, positions, LedStrip::new(8, MemoryWriter::new()));
        let summary = poll.one_iteration();

        assert_eq!(vec![5], summary.lit);
        assert_eq!(vec![5], poll.display().state().lit_positions());
    }

    #[test]
    fn run_returns_immediately_when_already_stopped() {
        let fake_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok("[]".to_string());
        };
        let stop = super::StopToken::new();
        stop.stop();

        let mut poll = poll_loop(fake_fetch_fn);
        assert_eq!(0, poll.run(&stop));
    }

    #[test]
    fn run_stops_during_wait() {
        let fake_fetch_fn = |_url: &str| -> result::TubeResult<String> {
            return Ok(r#"[{"stationName":"Bank","destinationName":"Epping","timeToStation":5}]"#.to_string());
        };
        let stop = super::StopToken::new();
        let thread_stop = stop.clone();
        let mut poll = poll_loop(fake_fetch_fn).with_interval(Duration::from_secs(3600));

        let handle = std::thread::spawn(move || {
            let cycles = poll.run(&thread_stop);
            return (cycles, poll);
        });
        std::thread::sleep(Duration::from_millis(200));
        stop.stop();

        let (cycles, poll) = handle.join().expect("join poll thread");
        assert_eq!(1, cycles);
        assert_eq!(vec![10], poll.display().state().lit_positions());
    }

    #[test]
    fn wait_times_out_without_stop() {
        let stop = super::StopToken::new();
        assert!(!stop.wait(Duration::from_millis(20)));
        assert!(!stop.wait(Duration::from_millis(0)));

        stop.stop();
        assert!(stop.wait(Duration::from_secs(3600)));
    }
}
