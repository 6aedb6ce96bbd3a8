// Lights the LED for the station a tube train is approaching.
//
// Enable SPI with sudo raspi-config before running on the Pi, or pass
// --skip-display to try it anywhere.
extern crate anyhow;
extern crate flexi_logger;
extern crate getopts;
#[macro_use]
extern crate log;
extern crate nix;
extern crate rppal;
#[macro_use]
extern crate serde_derive;
extern crate smart_leds;

mod config;
mod poll;
mod result;
mod stations;
mod strip;
mod tfl;
mod ws2812;

use nix::sys::signal::{SigSet, Signal};
use smart_leds::{SmartLedsWrite, RGB8};

fn shutdown_signals() -> SigSet {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    return signals;
}

// Must run before any other thread starts so every thread inherits the mask
// and only the waiter ever sees SIGINT/SIGTERM.
fn block_shutdown_signals() -> result::TubeResult<SigSet> {
    let signals = shutdown_signals();
    signals.thread_block()?;
    return Ok(signals);
}

// The first signal stops `stop` when `graceful`; anything else exits now.
fn spawn_signal_waiter(signals: SigSet, stop: poll::StopToken, graceful: bool) -> std::thread::JoinHandle<()> {
    return std::thread::spawn(move || {
        let mut requested = false;
        loop {
            let signal = match signals.wait() {
                Ok(signal) => signal,
                Err(err) => {
                    error!("Waiting for shutdown signals failed: {}", err);
                    return;
                },
            };
            if !graceful || requested {
                warn!("{} received, exiting", signal);
                std::process::exit(128 + signal as i32);
            }
            info!("{} received, shutting down", signal);
            requested = true;
            stop.stop();
        }
    });
}

fn init_logging(verbose: bool) -> result::TubeResult<flexi_logger::LoggerHandle> {
    let (level, duplicate) = if verbose {
        ("debug", flexi_logger::Duplicate::All)
    } else {
        ("info", flexi_logger::Duplicate::Info)
    };

    let handle = flexi_logger::Logger::try_with_env_or_str(level)?
        .log_to_file(flexi_logger::FileSpec::default())
        .duplicate_to_stderr(duplicate)
        .rotate(
            flexi_logger::Criterion::Size(10 * 1024 * 1024),
            flexi_logger::Naming::Numbers,
            flexi_logger::Cleanup::KeepLogFiles(5))
        .start()?;
    return Ok(handle);
}

fn tube_lines_report(client: &tfl::TflClient) -> String {
    let mut report = String::new();
    if let Some(lines) = client.get_tube_lines() {
        report.push_str(&format!("Found {} tube lines:\n", lines.len()));
        for line in lines {
            report.push_str(&format!("{} (ID: {})\n", line.name, line.id));
        }
    }
    return report;
}

fn stations_report(client: &tfl::TflClient, line_ids: &str) -> String {
    let line_ids: Vec<&str> = line_ids.split(',')
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();

    let mut report = String::new();
    for (line_id, stations) in client.get_stations_on_lines(&line_ids) {
        match stations {
            Some(stations) => {
                report.push_str(&format!("Found {} stations on the {} line:\n", stations.len(), line_id));
                for station in stations {
                    report.push_str(&format!("{}\n", station));
                }
            },
            None => report.push_str(&format!("Couldn't fetch stations for the {} line\n", line_id)),
        }
    }
    return report;
}

fn disruptions_report(client: &tfl::TflClient, modes: &str) -> String {
    match client.get_line_disruptions(modes) {
        Some(disruptions) => {
            let mut report = format!("Found {} disruptions:\n", disruptions.len());
            for disruption in disruptions {
                report.push_str(&format!("\n{}\n", disruption));
            }
            return report;
        },
        None => return "No disruptions found.\n".to_string(),
    }
}

// A bare --disruptions means the default modes.
fn disruption_modes(matches: &getopts::Matches) -> Option<String> {
    if !matches.opt_present("disruptions") {
        return None;
    }
    let modes = matches.opt_str("disruptions")
        .filter(|modes| !modes.trim().is_empty())
        .unwrap_or(tfl::DEFAULT_DISRUPTION_MODES.to_string());
    return Some(modes);
}

fn is_informational(matches: &getopts::Matches) -> bool {
    return matches.opt_present("list-lines")
        || matches.opt_present("list-stations")
        || matches.opt_present("disruptions");
}

fn station_positions(config: &config::Config) -> result::TubeResult<stations::StationPositionMap> {
    let num_pixels = config.num_pixels.unwrap_or(stations::DEFAULT_NUM_PIXELS);
    match config.stations {
        Some(ref entries) => {
            return stations::StationPositionMap::new(
                num_pixels, entries.iter().map(|(name, position)| (name.as_str(), *position)));
        },
        None => return stations::StationPositionMap::with_default_stations(num_pixels),
    }
}

fn poll_with_strip<W>(
    mut poll_loop: poll::PollLoop<strip::LedStrip<W>>,
    one_shot: bool,
    stop: &poll::StopToken) -> result::TubeResult<poll::PollLoop<strip::LedStrip<W>>>
where W: SmartLedsWrite<Color = RGB8>, W::Error: std::fmt::Debug {
    use crate::strip::StationDisplay;

    if one_shot {
        let summary = poll_loop.one_iteration();
        info!("{} arrivals, final position {:?}", summary.arrivals, summary.final_position());
        return Ok(poll_loop);
    }

    poll_loop.run(stop);

    poll_loop.display_mut().clear()?;
    return Ok(poll_loop);
}

fn run(matches: &getopts::Matches, stop: &poll::StopToken) -> result::TubeResult<()> {
    let config_path = matches.opt_str("config")
        .unwrap_or(config::DEFAULT_CONFIG_FILE.to_string());
    let config = config::load_config(&config_path).unwrap_or_default();

    let app_key = config.app_key().map(|key| key.to_string());
    if app_key.is_none() {
        warn!("API key not found in the configuration file.");
    }
    let mut client = tfl::TflClient::new(app_key);
    if let Some(base_url) = matches.opt_str("base-url") {
        client = client.with_base_url(&base_url);
    }

    if matches.opt_present("list-lines") {
        print!("{}", tube_lines_report(&client));
        return Ok(());
    }
    if let Some(line_ids) = matches.opt_str("list-stations") {
        print!("{}", stations_report(&client, &line_ids));
        return Ok(());
    }
    if let Some(modes) = disruption_modes(matches) {
        print!("{}", disruptions_report(&client, &modes));
        return Ok(());
    }

    let line = matches.opt_str("line")
        .or(config.line.clone())
        .unwrap_or(poll::DEFAULT_LINE.to_string());
    let watch_station = matches.opt_str("station").or(config.station.clone());
    let interval = match matches.opt_get::<u64>("interval")?.or(config.poll_interval_secs) {
        Some(secs) => std::time::Duration::from_secs(secs),
        None => poll::DEFAULT_POLL_INTERVAL,
    };
    let brightness = config.brightness.unwrap_or(strip::DEFAULT_BRIGHTNESS);
    let color = match config.color {
        Some([r, g, b]) => RGB8::new(r, g, b),
        None => strip::RED,
    };
    let positions = station_positions(&config)?;
    let num_pixels = positions.num_pixels();
    let one_shot = matches.opt_present("one-shot");

    if matches.opt_present("skip-display") {
        let led_strip = strip::LedStrip::new(num_pixels, strip::MemoryWriter::new())
            .with_active_color(color)
            .with_brightness(brightness);
        let poll_loop = poll::PollLoop::new(client, positions, led_strip)
            .with_line(&line)
            .with_watch_station(watch_station)
            .with_interval(interval);
        let poll_loop = poll_with_strip(poll_loop, one_shot, stop)?;

        let led_strip = poll_loop.display();
        info!("Simulated strip: {} frames written, lit {:?}",
              led_strip.writer().frames_written(), led_strip.state().lit_positions());
        if let Some(frame) = led_strip.writer().last_frame() {
            debug!("Last frame: {:?}", frame);
        }
        return Ok(());
    }

    let led_strip = strip::LedStrip::new(num_pixels, ws2812::open(num_pixels)?)
        .with_active_color(color)
        .with_brightness(brightness);
    let poll_loop = poll::PollLoop::new(client, positions, led_strip)
        .with_line(&line)
        .with_watch_station(watch_station)
        .with_interval(interval);
    poll_with_strip(poll_loop, one_shot, stop)?;
    return Ok(());
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optopt("c", "config", "JSON config holding tfl_api.app_key.", "FILE");
    opts.optopt("l", "line", "Line to poll (default central).", "LINE");
    opts.optopt("s", "station", "Also print arrivals at this station.", "NAME");
    opts.optflag("d", "skip-display", "don't drive the LED strip");
    opts.optflag("o", "one-shot", "run a single poll cycle and exit");
    opts.optopt("i", "interval", "Seconds between polls (default 10).", "SECS");
    opts.optopt("", "base-url", "TfL API root (default https://api.tfl.gov.uk).", "URL");
    opts.optflag("", "list-lines", "print the tube lines and exit");
    opts.optopt("", "list-stations", "print stop points on these lines and exit", "LINES");
    opts.optflagopt("", "disruptions", "print disruptions for these modes (default tube,dlr,overground,tram) and exit", "MODES");
    opts.optflag("v", "verbose", "debug logging");
    opts.optflag("h", "help", "print this help");
    return opts;
}

fn main() {
    let signals = match block_shutdown_signals() {
        Ok(signals) => signals,
        Err(err) => {
            eprintln!("Couldn't block shutdown signals: {:#}", err);
            std::process::exit(1);
        },
    };

    let args: Vec<String> = std::env::args().collect();
    let opts = options();

    let brief = format!("Usage: {} [options]", args[0]);
    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{}\n{}", err, opts.usage(&brief));
            std::process::exit(2);
        },
    };

    if matches.opt_present("help") {
        print!("{}", opts.usage(&brief));
        return;
    }

    let stop = poll::StopToken::new();
    let graceful = !matches.opt_present("one-shot") && !is_informational(&matches);
    spawn_signal_waiter(signals, stop.clone(), graceful);

    let _logger = match init_logging(matches.opt_present("verbose")) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("Logging unavailable: {}", err);
            None
        },
    };

    if let Err(err) = run(&matches, &stop) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
