//! Engine configuration: §6.3 keys, loaded from a `[cdr]` TOML table or defaulted.

use serde::Deserialize;
use std::path::Path;

use crate::error::EngineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enable: bool,
    pub debug: bool,
    pub unanswered: bool,
    pub congestion: bool,
    pub endbeforehexten: bool,
    pub initiatedseconds: bool,
    pub batch: bool,
    pub size: u32,
    pub time: u32,
    pub scheduleronly: bool,
    pub safeshutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enable: true,
            debug: false,
            unanswered: false,
            congestion: false,
            endbeforehexten: false,
            initiatedseconds: false,
            batch: false,
            size: 100,
            time: 300,
            scheduleronly: false,
            safeshutdown: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    cdr: Config,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&text)?;
        file.cdr.validate()?;
        Ok(file.cdr)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.size > 1000 {
            return Err(EngineError::Config(format!(
                "size must be in 0..=1000, got {}",
                self.size
            )));
        }
        if self.time > 86_400 {
            return Err(EngineError::Config(format!(
                "time must be in 0..=86400, got {}",
                self.time
            )));
        }
        Ok(())
    }
}
