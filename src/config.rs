use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::Level;
use serde::Deserialize;

use crate::arp::ArpSettings;
use crate::backoff::millis;
use crate::logger::parse_level;
use crate::metadata::MetadataConfig;
use crate::render::Platform;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentConfig {
    pub platform: Platform,
    pub log_level: String,
    pub metadata: MetadataConfig,
    pub arp: ArpSettings,
    #[serde(rename = "broadcast-wait-ms", with = "millis")]
    pub broadcast_wait: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            log_level: "info".into(),
            metadata: MetadataConfig::default(),
            arp: ArpSettings::default(),
            broadcast_wait: Duration::from_secs(120),
        }
    }
}

impl AgentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match read_to_string(p) {
            Ok(contents) => Self::from_json(&contents)
                .map_err(|e| anyhow!("unable to parse configuration {:?}: {}", p, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow!("unable to read configuration {:?}: {}", p, e)),
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.level()?;
        Ok(config)
    }

    pub fn level(&self) -> Result<Level> {
        parse_level(&self.log_level)
    }
}
