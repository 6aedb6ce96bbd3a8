// Client for the TfL unified API: https://api.tfl.gov.uk
//
// Every call degrades instead of failing: errors are logged and the caller
// gets an empty list (arrivals) or None (the informational endpoints).
extern crate anyhow;
extern crate chrono;
extern crate reqwest;
extern crate serde;
extern crate serde_json;

use anyhow::Context;
use crate::result;

pub const BASE_URL: &str = "https://api.tfl.gov.uk";
pub const DEFAULT_DISRUPTION_MODES: &str = "tube,dlr,overground,tram";

pub type FetchFn = fn(&str) -> result::TubeResult<String>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalRecord {
    pub station_name: String,
    #[serde(default)]
    pub destination_name: String,
    pub time_to_station: i64,

    #[serde(default)]
    pub line_id: Option<String>,
    #[serde(default)]
    pub platform_name: Option<String>,
    #[serde(default)]
    pub expected_arrival: Option<chrono::DateTime<chrono::Utc>>,
}

impl ArrivalRecord {
    #[cfg(test)]
    pub fn new(station_name: &str, destination_name: &str, time_to_station: i64) -> ArrivalRecord {
        return ArrivalRecord{
            station_name: station_name.to_string(),
            destination_name: destination_name.to_string(),
            time_to_station: time_to_station,
            line_id: None,
            platform_name: None,
            expected_arrival: None,
        };
    }

    pub fn summary(&self) -> String {
        return format!("Train to {} arriving at {} in {} seconds.",
                       self.destination_name, self.station_name, self.time_to_station);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPoint {
    pub common_name: String,
    #[serde(default)]
    pub station_naptan: Option<String>,
}

impl std::fmt::Display for StopPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        return write!(f, "{} (ID: {})",
                      self.common_name,
                      self.station_naptan.as_deref().unwrap_or("none"));
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disruption {
    #[serde(default)]
    pub line_id: Option<String>,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub affected_stops: Vec<StopPoint>,
}

impl std::fmt::Display for Disruption {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Line: {}", self.line_id.as_deref().unwrap_or("Unknown Line"))?;
        writeln!(f, "Category: {}", self.category)?;
        writeln!(f, "Description: {}", self.description)?;
        write!(f, "Affected Stops:")?;
        for stop in &self.affected_stops {
            write!(f, "\n  - {}", stop)?;
        }
        return Ok(());
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TubeLine {
    pub id: String,
    pub name: String,
}

pub struct TflClient {
    base_url: String,
    app_key: Option<String>,
    fetch_fn: FetchFn,
}

impl TflClient {
    pub fn new(app_key: Option<String>) -> TflClient {
        return TflClient{
            base_url: BASE_URL.to_string(),
            app_key: app_key,
            fetch_fn: real_fetch_json_fn,
        };
    }

    pub fn with_base_url(mut self, base_url: &str) -> TflClient {
        self.base_url = base_url.trim_end_matches('/').to_string();
        return self;
    }

    pub fn with_fetch_fn(mut self, fetch_fn: FetchFn) -> TflClient {
        self.fetch_fn = fetch_fn;
        return self;
    }

    fn url(&self, path: &str) -> result::TubeResult<String> {
        let raw = format!("{}/{}", self.base_url, path);
        let url = match self.app_key {
            Some(ref key) => reqwest::Url::parse_with_params(&raw, &[("app_key", key)])?,
            None => reqwest::Url::parse(&raw)?,
        };
        return Ok(url.to_string());
    }

    fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> result::TubeResult<T> {
        // The full URL carries the app key, so only the path is logged.
        debug!("Fetching /{}", path);
        let body = (self.fetch_fn)(&self.url(path)?)?;
        let parsed = serde_json::from_str(&body)
            .with_context(|| format!("while parsing response from /{}", path))?;
        return Ok(parsed);
    }

    pub fn get_arrivals(&self, line: &str) -> Vec<ArrivalRecord> {
        match self.fetch_json::<Vec<ArrivalRecord>>(&format!("line/{}/arrivals", line)) {
            Ok(arrivals) => return arrivals,
            Err(err) => {
                error!("Error fetching data from TFL API: {:#}", err);
                return vec![];
            },
        }
    }

    pub fn get_tube_lines(&self) -> Option<Vec<TubeLine>> {
        match self.fetch_json::<Vec<TubeLine>>("line/mode/tube") {
            Ok(lines) => {
                info!("Found {} tube lines", lines.len());
                return Some(lines);
            },
            Err(err) => {
                error!("Error fetching Tube lines: {:#}", err);
                return None;
            },
        }
    }

    pub fn get_stations_on_lines(&self, line_ids: &[&str]) -> std::collections::BTreeMap<String, Option<Vec<StopPoint>>> {
        let mut all_stations = std::collections::BTreeMap::new();

        for line_id in line_ids {
            let stations = match self.fetch_json::<Vec<StopPoint>>(&format!("line/{}/stoppoints", line_id)) {
                Ok(stations) => {
                    info!("Found {} stations on the {} line", stations.len(), line_id);
                    Some(stations)
                },
                Err(err) => {
                    error!("Error fetching stations for {} line: {:#}", line_id, err);
                    None
                },
            };
            all_stations.insert(line_id.to_string(), stations);
        }

        return all_stations;
    }

    pub fn get_line_disruptions(&self, modes: &str) -> Option<Vec<Disruption>> {
        match self.fetch_json::<Vec<Disruption>>(&format!("line/mode/{}/disruption", modes)) {
            Ok(ref disruptions) if disruptions.is_empty() => {
                info!("No disruptions found for modes {}", modes);
                return None;
            },
            Ok(disruptions) => {
                info!("Found {} disruptions for modes {}", disruptions.len(), modes);
                return Some(disruptions);
            },
            Err(err) => {
                error!("Error fetching disruptions for {}: {:#}", modes, err);
                return None;
            },
        }
    }
}

fn real_fetch_json_fn(url: &str) -> result::TubeResult<String> {
    use std::io::Read;

    let client = reqwest::blocking::Client::new();
    let mut response = client.get(url)
        .header(reqwest::header::USER_AGENT, "tubelights")
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.without_url())?;
    let mut response_body = String::new();
    response.read_to_string(&mut response_body)?;
    return Ok(response_body);
}
