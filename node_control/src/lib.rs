#![cfg_attr(not(test), no_std)]
//! Drivers and measurement cycle of a LoRaWAN environmental monitoring node.
//!
//! Hardware is reached through the `embedded-hal` / `embedded-io` traits and the small
//! seams in [bsp], so the same code runs on the microcontroller and in the console simulator.

// must come first, the logging macros are used by every other module
mod fmt;

pub mod bsp;
pub mod config;
pub mod crc;
pub mod edt;
pub mod error;
pub mod fuel_gauge;
pub mod map;
pub mod node;
pub mod payload;

pub mod bmp388;
pub mod dht22;
pub mod ds18b20;
pub mod light;
pub mod scd30;
pub mod soil_moisture;

pub mod lorawan;
pub mod mkrwan;
