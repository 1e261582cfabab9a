//! Runtime glue that wires configs, stage loops, telemetry, and runner
//! orchestration.

pub mod config;
pub mod runner;
pub mod stage;
pub mod telemetry;
