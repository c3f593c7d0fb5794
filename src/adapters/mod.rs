//! Driven adapters: hardware drivers and platform services behind the
//! port traits.

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
