use crate::bmp388;
use crate::lorawan::Region;
use crate::scd30;

/// Tunables of the measurement cycle. Defaults are what the node ships with.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NodeConfig {
    /// Time between two measurement cycles.
    pub measurement_period_ms: u32,
    /// How long to wait for the CO2 sensor before asking again.
    pub co2_retry_ms: u32,
    /// Polls of the CO2 sensor per cycle before giving up.
    pub co2_max_attempts: u8,
    /// Consecutive failed cycles after which the CO2 sensor is restarted.
    pub co2_restart_after: u8,
    /// Measurement interval programmed into the CO2 sensor, seconds.
    pub co2_interval_s: u16,
    /// Altitude of the installation site, used to calibrate the barometer.
    pub altitude_m: u16,
    /// LoRaWAN application port of the uplinks.
    pub uplink_port: u8,
    /// Ask the network for an acknowledgement of every uplink.
    pub confirmed_uplinks: bool,
    /// OTAA join attempts before `configure` fails.
    pub join_attempts: u8,
    pub region: Region,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            measurement_period_ms: 10 * 60 * 1000,
            co2_retry_ms: 2000,
            co2_max_attempts: 5,
            co2_restart_after: 3,
            co2_interval_s: scd30::DEFAULT_INTERVAL_S,
            altitude_m: bmp388::DEFAULT_ALTITUDE_M,
            uplink_port: 1,
            confirmed_uplinks: true,
            join_attempts: 3,
            region: Region::EU868,
        }
    }
}
