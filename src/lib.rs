//! Stress and fault-injection toolbox served over HTTP.
//!
//! Three independent components back the endpoints:
//!
//! - [`cpu::LoadPool`]: CPU-consuming workers, started and drained on
//!   demand
//! - [`ram::LeakPool`]: retained memory allocations with grow, shrink,
//!   periodic-leak and reset operations
//! - [`probe::ProbeSet`]: startup/liveness/readiness probes with
//!   runtime-configurable failure injection
//!
//! The [`server`] module wires them into an axum router; [`config`]
//! builds the process configuration from environment variables.

pub mod config;
pub mod cpu;
pub mod probe;
pub mod ram;
pub mod server;
pub mod util;
pub mod worker;

pub use config::{Config, ConfigError, ProbesConfig};
pub use cpu::LoadPool;
pub use probe::{Probe, ProbeError, ProbeKind, ProbeOutcome, ProbeSet, ProbeSettings, ProbeUpdate};
pub use ram::{LeakPool, MemorySnapshot, ShrinkOutcome};
pub use server::{router, AppState};
