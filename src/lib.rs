//! AirNode firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod aqi;
pub mod bus;
pub mod config;
pub mod connectivity;
pub mod events;
pub mod power;
pub mod sensors;
pub mod settings;
pub mod telemetry;
pub mod update;

mod error;
pub mod pins;

pub use error::{
    BusError, ConnectivityError, Error, Result, SensorError, StorageError, UpdateError,
};

// Adapters compile on all targets; the platform-specific implementations
// are guarded by cfg attributes inside.
pub mod adapters;
pub mod drivers;
