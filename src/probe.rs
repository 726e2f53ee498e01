//! Health probes with configurable failure injection.
//!
//! One state machine per probe kind. Evaluation consumes injected
//! failures; configuration swaps any subset of the injection settings at
//! runtime. Nothing here resets on its own: state persists until the
//! process exits or a new configuration is applied.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::sleep;
use tracing::info;

/// The three probe kinds kubelet-style orchestration knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Startup,
    Liveness,
    Readiness,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Startup => write!(f, "startup"),
            ProbeKind::Liveness => write!(f, "liveness"),
            ProbeKind::Readiness => write!(f, "readiness"),
        }
    }
}

/// Initial state of a single probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub status_ok: u16,
    pub status_fail: u16,
    pub fail: bool,
    pub fail_count: u32,
    pub delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            status_ok: 200,
            status_fail: 500,
            fail: false,
            fail_count: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Partial reconfiguration of a probe; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeUpdate {
    pub fail: Option<bool>,
    pub fail_count: Option<u32>,
    pub delay: Option<Duration>,
}

impl ProbeUpdate {
    pub fn is_empty(&self) -> bool {
        self.fail.is_none() && self.fail_count.is_none() && self.delay.is_none()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no probe setting supplied, set at least one of: fail, nb_failures, delay")]
    NothingToConfigure,
}

/// How a single evaluation went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Probe passed with the configured success status.
    Pass { status: u16 },
    /// The sticky fail flag is set.
    HardFail { status: u16 },
    /// One failure consumed from the counter; `remaining` are left.
    CountedFail { status: u16, remaining: u32 },
}

impl ProbeOutcome {
    pub fn status(&self) -> u16 {
        match *self {
            ProbeOutcome::Pass { status }
            | ProbeOutcome::HardFail { status }
            | ProbeOutcome::CountedFail { status, .. } => status,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, ProbeOutcome::Pass { .. })
    }
}

struct Injection {
    fail: bool,
    fail_count: u32,
    delay: Duration,
}

/// One probe state machine.
pub struct Probe {
    kind: ProbeKind,
    status_ok: u16,
    status_fail: u16,
    injection: Mutex<Injection>,
}

impl Probe {
    pub fn new(kind: ProbeKind, settings: ProbeSettings) -> Self {
        Self {
            kind,
            status_ok: settings.status_ok,
            status_fail: settings.status_fail,
            injection: Mutex::new(Injection {
                fail: settings.fail,
                fail_count: settings.fail_count,
                delay: settings.delay,
            }),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Evaluates the probe: sleeps the configured delay, then reports
    /// success or consumes one injected failure. The sticky fail flag
    /// wins over the counter, and the counter never moves by more than
    /// one per evaluation.
    pub async fn evaluate(&self) -> ProbeOutcome {
        // The sleep happens outside the lock; only the decrement is
        // serialized.
        let delay = self.injection.lock().delay;
        if !delay.is_zero() {
            info!(
                "{} probe sleeping for {}",
                self.kind,
                humantime::format_duration(delay)
            );
            sleep(delay).await;
        }

        let mut injection = self.injection.lock();
        if injection.fail {
            ProbeOutcome::HardFail {
                status: self.status_fail,
            }
        } else if injection.fail_count > 0 {
            injection.fail_count -= 1;
            ProbeOutcome::CountedFail {
                status: self.status_fail,
                remaining: injection.fail_count,
            }
        } else {
            ProbeOutcome::Pass {
                status: self.status_ok,
            }
        }
    }

    /// Applies every supplied field under the lock; an empty update is
    /// rejected before any state is touched.
    pub fn configure(&self, update: ProbeUpdate) -> Result<(), ProbeError> {
        if update.is_empty() {
            return Err(ProbeError::NothingToConfigure);
        }

        let mut injection = self.injection.lock();
        if let Some(fail) = update.fail {
            injection.fail = fail;
            info!("{} probe set to fail: {fail}", self.kind);
        }
        if let Some(count) = update.fail_count {
            injection.fail_count = count;
            info!("{} probe set to fail {count} time(s)", self.kind);
        }
        if let Some(delay) = update.delay {
            injection.delay = delay;
            info!(
                "{} probe delay set to {}",
                self.kind,
                humantime::format_duration(delay)
            );
        }
        Ok(())
    }
}

/// The three probes, independently configurable.
pub struct ProbeSet {
    startup: Probe,
    liveness: Probe,
    readiness: Probe,
}

impl ProbeSet {
    pub fn new(startup: ProbeSettings, liveness: ProbeSettings, readiness: ProbeSettings) -> Self {
        Self {
            startup: Probe::new(ProbeKind::Startup, startup),
            liveness: Probe::new(ProbeKind::Liveness, liveness),
            readiness: Probe::new(ProbeKind::Readiness, readiness),
        }
    }

    pub fn probe(&self, kind: ProbeKind) -> &Probe {
        match kind {
            ProbeKind::Startup => &self.startup,
            ProbeKind::Liveness => &self.liveness,
            ProbeKind::Readiness => &self.readiness,
        }
    }
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self::new(
            ProbeSettings::default(),
            ProbeSettings::default(),
            ProbeSettings::default(),
        )
    }
}
