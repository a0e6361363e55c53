use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use node_control::config::NodeConfig;
use node_control::lorawan::{Credentials, InvalidHex};

/// Read when no configuration file is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "env-node.toml";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    pub node: NodeConfig,
    pub lorawan: LorawanConfig,
    pub simulation: Simulation,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LorawanConfig {
    pub dev_eui: String,
    pub app_eui: String,
    pub app_key: String,
}

impl Default for LorawanConfig {
    fn default() -> Self {
        LorawanConfig {
            dev_eui: "A8610A32332C9203".to_string(),
            app_eui: "0000000000000000".to_string(),
            app_key: "87C35A509FF383F53757E019092655E0".to_string(),
        }
    }
}

impl LorawanConfig {
    pub fn credentials(&self) -> Result<Credentials, InvalidHex> {
        Credentials::from_hex(&self.dev_eui, &self.app_eui, &self.app_key)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Simulation {
    /// Simulated milliseconds per real millisecond.
    pub time_scale: f64,
    pub battery_capacity_mah: f32,
    /// Charge at start, %.
    pub battery_charge: f32,
    pub average_current_ma: f32,
    /// Chance that the CO2 sensor has no sample when polled.
    pub co2_not_ready: f64,
    /// Chance that a frame gets lost on the air.
    pub uplink_loss: f64,
    /// Chance that a DHT22 or DS18B20 transfer is corrupted.
    pub sensor_faults: f64,
    pub seed: Option<u64>,
    pub log_file: PathBuf,
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            time_scale: 600.0,
            battery_capacity_mah: 2000.0,
            battery_charge: 100.0,
            average_current_ma: 12.0,
            co2_not_ready: 0.4,
            uplink_loss: 0.05,
            sensor_faults: 0.02,
            seed: None,
            log_file: PathBuf::from("env-node.log"),
        }
    }
}

impl SimConfig {
    /// Loads `path`, or [DEFAULT_CONFIG_FILE] if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<SimConfig> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
            None => return Ok(SimConfig::default()),
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        SimConfig::parse(&text).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<SimConfig> {
        let config: SimConfig = toml::from_str(text)?;
        if config.simulation.time_scale <= 0.0 {
            anyhow::bail!("time_scale must be positive");
        }
        config
            .lorawan
            .credentials()
            .map_err(|e| anyhow::anyhow!("lorawan: {}", e))?;
        Ok(config)
    }
}
