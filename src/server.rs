//! Thin HTTP layer over the pools and probes.
//!
//! Handlers validate and normalize query input, call into the owning
//! component and render its result; no stress or probe logic lives here.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cpu::LoadPool;
use crate::probe::{ProbeKind, ProbeOutcome, ProbeSet, ProbeUpdate};
use crate::ram::{LeakPool, MemorySnapshot};
use crate::util::{human_size, parse_bool};

const SIZE_1MIB: usize = 1024 * 1024;

/// Shared handler state: one pool of each kind for the process lifetime.
#[derive(Clone)]
pub struct AppState {
    pub cpu: Arc<LoadPool>,
    pub ram: Arc<LeakPool>,
    pub probes: Arc<ProbeSet>,
}

impl AppState {
    pub fn new(probes: ProbeSet) -> Self {
        Self {
            cpu: Arc::new(LoadPool::new()),
            ram: Arc::new(LeakPool::new()),
            probes: Arc::new(probes),
        }
    }
}

/// Builds the full route map over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cpu/load", get(cpu_load))
        .route("/cpu/reset", get(cpu_reset))
        .route("/ram/increase", get(ram_increase))
        .route("/ram/decrease", get(ram_decrease))
        .route("/ram/leak", get(ram_leak))
        .route("/ram/reset", get(ram_reset))
        .route("/ram/status", get(ram_status))
        .route("/started", get(startup_evaluate).post(startup_configure))
        .route("/alive", get(liveness_evaluate).post(liveness_configure))
        .route("/ready", get(readiness_evaluate).post(readiness_configure))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(reason: String) -> Response {
    warn!("{reason}");
    (StatusCode::BAD_REQUEST, reason).into_response()
}

/// Parses an optional humantime duration query parameter; absent means
/// zero.
fn duration_param(value: Option<&str>, name: &str) -> Result<Duration, Response> {
    let Some(value) = value else {
        return Ok(Duration::ZERO);
    };
    humantime::parse_duration(value)
        .map_err(|e| bad_request(format!("{name} is not a valid duration: {e}")))
}

/* CPU */

#[derive(Deserialize)]
struct CpuLoadParams {
    nb_workers: Option<usize>,
    pacing: Option<String>,
}

async fn cpu_load(State(state): State<AppState>, Query(params): Query<CpuLoadParams>) -> Response {
    let pacing = match duration_param(params.pacing.as_deref(), "pacing") {
        Ok(pacing) => pacing,
        Err(response) => return response,
    };

    let mut count = params.nb_workers.unwrap_or(1);
    if count == 0 {
        // 0 means one worker per logical CPU
        count = num_cpus::get();
    }

    state.cpu.start(count, pacing);
    StatusCode::OK.into_response()
}

async fn cpu_reset(State(state): State<AppState>) -> Response {
    state.cpu.stop_all().await;
    StatusCode::OK.into_response()
}

/* RAM */

#[derive(Deserialize)]
struct RamSizeParams {
    size: Option<usize>,
}

#[derive(Serialize)]
struct ShrinkBody {
    released: u64,
    shortfall: u64,
    #[serde(flatten)]
    snapshot: MemorySnapshot,
}

async fn ram_increase(
    State(state): State<AppState>,
    Query(params): Query<RamSizeParams>,
) -> Response {
    let size = params.size.unwrap_or(SIZE_1MIB);
    info!(
        "increasing memory usage by {} ({size} bytes)",
        human_size(size as f64)
    );
    state.ram.grow(size);

    let snapshot = state.ram.stats();
    info!("{snapshot}");
    (StatusCode::OK, Json(snapshot)).into_response()
}

async fn ram_decrease(
    State(state): State<AppState>,
    Query(params): Query<RamSizeParams>,
) -> Response {
    let size = params.size.unwrap_or(SIZE_1MIB);
    info!(
        "decreasing memory usage by {} ({size} bytes)",
        human_size(size as f64)
    );
    let outcome = state.ram.shrink(size);

    let snapshot = state.ram.stats();
    info!("{snapshot}");
    let body = ShrinkBody {
        released: outcome.released,
        shortfall: outcome.shortfall,
        snapshot,
    };

    if outcome.shortfall > 0 {
        warn!(
            "could only release {} ({} bytes) out of the {} ({size} bytes) asked",
            human_size(outcome.released as f64),
            outcome.released,
            human_size(size as f64)
        );
        return (StatusCode::PARTIAL_CONTENT, Json(body)).into_response();
    }
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Deserialize)]
struct RamLeakParams {
    size: Option<usize>,
    interval: Option<String>,
}

async fn ram_leak(State(state): State<AppState>, Query(params): Query<RamLeakParams>) -> Response {
    let interval = match duration_param(params.interval.as_deref(), "interval") {
        Ok(interval) => interval,
        Err(response) => return response,
    };
    let size = params.size.unwrap_or(SIZE_1MIB);

    state.ram.leak(size, interval);
    StatusCode::OK.into_response()
}

async fn ram_reset(State(state): State<AppState>) -> Response {
    let snapshot = state.ram.reset_all().await;
    info!("{snapshot}");
    (StatusCode::OK, Json(snapshot)).into_response()
}

async fn ram_status(State(state): State<AppState>) -> Response {
    let snapshot = state.ram.stats();
    info!("{snapshot}");
    (StatusCode::OK, Json(snapshot)).into_response()
}

/* PROBES */

async fn startup_evaluate(State(state): State<AppState>) -> Response {
    evaluate_probe(&state, ProbeKind::Startup).await
}

async fn liveness_evaluate(State(state): State<AppState>) -> Response {
    evaluate_probe(&state, ProbeKind::Liveness).await
}

async fn readiness_evaluate(State(state): State<AppState>) -> Response {
    evaluate_probe(&state, ProbeKind::Readiness).await
}

async fn evaluate_probe(state: &AppState, kind: ProbeKind) -> Response {
    let outcome = state.probes.probe(kind).evaluate().await;
    let status =
        StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match outcome {
        ProbeOutcome::Pass { .. } => status.into_response(),
        ProbeOutcome::HardFail { .. } => {
            info!("{kind} probe set to fail");
            (status, "probe set to fail").into_response()
        }
        ProbeOutcome::CountedFail { remaining, .. } => {
            let body = format!("{remaining} failure(s) remaining");
            info!("{kind} probe failing: {body}");
            (status, body).into_response()
        }
    }
}

#[derive(Deserialize)]
struct ProbeConfigParams {
    fail: Option<String>,
    nb_failures: Option<i64>,
    delay: Option<String>,
}

async fn startup_configure(
    State(state): State<AppState>,
    Query(params): Query<ProbeConfigParams>,
) -> Response {
    configure_probe(&state, ProbeKind::Startup, params)
}

async fn liveness_configure(
    State(state): State<AppState>,
    Query(params): Query<ProbeConfigParams>,
) -> Response {
    configure_probe(&state, ProbeKind::Liveness, params)
}

async fn readiness_configure(
    State(state): State<AppState>,
    Query(params): Query<ProbeConfigParams>,
) -> Response {
    configure_probe(&state, ProbeKind::Readiness, params)
}

fn configure_probe(state: &AppState, kind: ProbeKind, params: ProbeConfigParams) -> Response {
    let mut update = ProbeUpdate::default();

    if let Some(ref value) = params.fail {
        match parse_bool(value) {
            Some(fail) => update.fail = Some(fail),
            None => return bad_request(format!("fail is not a boolean (value: {value})")),
        }
    }
    if let Some(count) = params.nb_failures {
        if count < 0 {
            return bad_request(format!("nb_failures is inferior to zero (value: {count})"));
        }
        match u32::try_from(count) {
            Ok(count) => update.fail_count = Some(count),
            Err(_) => return bad_request(format!("nb_failures is out of range (value: {count})")),
        }
    }
    if let Some(ref value) = params.delay {
        match duration_param(Some(value), "delay") {
            Ok(delay) => update.delay = Some(delay),
            Err(response) => return response,
        }
    }

    match state.probes.probe(kind).configure(update) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => bad_request(format!("{kind} probe not reconfigured: {e}")),
    }
}
