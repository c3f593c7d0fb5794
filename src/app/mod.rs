//! Application layer: ports, context, events, and the tick orchestrator.

pub mod context;
pub mod events;
pub mod ports;
pub mod service;
