extern crate anyhow;
extern crate serde;
extern crate serde_json;

use anyhow::Context;
use crate::result;

pub const DEFAULT_CONFIG_FILE: &str = "tfl_api_credentials.json";

#[derive(Debug, Default, Deserialize)]
pub struct TflApiSection {
    pub app_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub tfl_api: Option<TflApiSection>,
    pub app_key: Option<String>,

    pub line: Option<String>,
    pub station: Option<String>,
    pub num_pixels: Option<usize>,
    pub poll_interval_secs: Option<u64>,
    pub brightness: Option<f32>,
    pub color: Option<[u8; 3]>,
    pub stations: Option<std::collections::BTreeMap<String, usize>>,
}

impl Config {
    // tfl_api.app_key wins over a top-level app_key.
    pub fn app_key(&self) -> Option<&str> {
        let nested = self.tfl_api.as_ref().and_then(|api| api.app_key.as_deref());
        return nested.or(self.app_key.as_deref());
    }
}

pub fn parse_config(raw: &str) -> result::TubeResult<Config> {
    let config: Config = serde_json::from_str(raw)
        .with_context(|| format!("while parsing config"))?;
    return Ok(config);
}

pub fn config_from_file<P: AsRef<std::path::Path>>(path: P) -> result::TubeResult<Config> {
    let debug_path = path.as_ref().display().to_string();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Opening config from '{}'", debug_path))?;
    return parse_config(&raw);
}

/// Loads the config file, logging and returning `None` when it is missing
/// or malformed.
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Option<Config> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Configuration file {} not found.", path.display());
        return None;
    }

    match config_from_file(path) {
        Ok(config) => {
            debug!("Loaded configuration from {}", path.display());
            return Some(config);
        },
        Err(err) => {
            warn!("Error loading configuration file: {:#}", err);
            return None;
        },
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn nested_app_key() {
        let config = super::load_config("testdata/config.json").expect("load config.json");

        assert_eq!(Some("nested-key"), config.app_key());
        assert_eq!(Some("central".to_string()), config.line);
        assert_eq!(Some(50), config.num_pixels);
        assert_eq!(Some([255, 0, 0]), config.color);

        let stations = config.stations.expect("stations");
        assert_eq!(Some(&5), stations.get("Oxford Circus"));
        assert_eq!(Some(&10), stations.get("Bank"));
    }

    #[test]
    fn flat_app_key() {
        let config = super::load_config("testdata/config_flat.json").expect("load config_flat.json");

        assert_eq!(Some("flat-key"), config.app_key());
        assert!(config.stations.is_none());
        assert!(config.poll_interval_secs.is_none());
    }

    #[test]
    fn nested_key_takes_precedence() {
        let config = super::parse_config(
            r#"{"app_key": "flat", "tfl_api": {"app_key": "nested"}}"#).expect("parse");
        assert_eq!(Some("nested"), config.app_key());

        let config = super::parse_config(r#"{"app_key": "flat", "tfl_api": {}}"#).expect("parse");
        assert_eq!(Some("flat"), config.app_key());
    }

    #[test]
    fn missing_file_is_absent() {
        assert!(super::load_config("testdata/does_not_exist.json").is_none());
    }

    #[test]
    fn malformed_file_is_absent() {
        assert!(super::load_config("testdata/config_malformed.json").is_none());
        assert!(super::config_from_file("testdata/config_malformed.json").is_err());
    }

    #[test]
    fn empty_object_has_no_key() {
        let config = super::parse_config("{}").expect("parse");
        assert_eq!(None, config.app_key());
    }
}
