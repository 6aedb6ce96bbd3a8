use crate::result;
use crate::tfl;

pub const DEFAULT_NUM_PIXELS: usize = 50;

const DEFAULT_STATIONS: [(&str, usize); 4] = [
    ("Oxford Circus", 5),
    ("Bond Street", 6),
    ("Bank", 10),
    ("Liverpool Street", 12),
];

// Station names from the API and from config are compared case-insensitively,
// both when filtering arrivals and when mapping to LED positions.
fn normalize(station_name: &str) -> String {
    return station_name.to_lowercase();
}

pub fn filter_by_station<'a>(arrivals: &'a [tfl::ArrivalRecord], station_name: &str) -> Vec<&'a tfl::ArrivalRecord> {
    if station_name.is_empty() {
        return vec![];
    }

    let wanted = normalize(station_name);
    return arrivals.iter()
        .filter(|arrival| normalize(&arrival.station_name) == wanted)
        .collect();
}

#[derive(Debug, Clone)]
pub struct StationPositionMap {
    num_pixels: usize,
    positions: std::collections::HashMap<String, usize>,
}

impl StationPositionMap {
    pub fn new<I, S>(num_pixels: usize, entries: I) -> result::TubeResult<StationPositionMap>
    where I: IntoIterator<Item = (S, usize)>,
          S: AsRef<str> {
        if num_pixels == 0 {
            return Err(result::make_error("Strip must have at least one pixel"));
        }

        let mut positions = std::collections::HashMap::new();
        for (name, position) in entries {
            let name = name.as_ref();
            if position >= num_pixels {
                return Err(result::make_error(&format!(
                    "Position {} for '{}' is outside the strip (0..{})", position, name, num_pixels)));
            }
            if positions.insert(normalize(name), position).is_some() {
                return Err(result::make_error(&format!(
                    "Station '{}' is configured more than once", name)));
            }
        }

        return Ok(StationPositionMap{
            num_pixels: num_pixels,
            positions: positions,
        });
    }

    pub fn with_default_stations(num_pixels: usize) -> result::TubeResult<StationPositionMap> {
        return StationPositionMap::new(num_pixels, DEFAULT_STATIONS.iter().cloned());
    }

    pub fn num_pixels(&self) -> usize {
        return self.num_pixels;
    }

    pub fn len(&self) -> usize {
        return self.positions.len();
    }

    /// LED index for a station, or `None` when the station has no LED.
    pub fn position(&self, station_name: &str) -> Option<usize> {
        return self.positions.get(&normalize(station_name)).copied();
    }
}
