use axum::{extract::State, Json};
use serde::Serialize;

use super::AdminState;
use crate::config::RunMode;
use crate::routing::{GroupPolicy, RouteInfo};
use crate::security::traffic_guard::TrafficSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub run_mode: RunMode,
    pub uptime_secs: u64,
    pub routes: usize,
}

#[derive(Serialize)]
pub struct TrafficSummary {
    pub policy: &'static str,
    pub default_freq: f64,
    pub groups: Vec<GroupPolicy>,
    pub records: Vec<TrafficSnapshot>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        run_mode: state.run_mode,
        uptime_secs: state.started.elapsed().as_secs(),
        routes: state.table.len(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteInfo>> {
    Json(state.table.routes())
}

pub async fn get_traffic(State(state): State<AdminState>) -> Json<TrafficSummary> {
    let (policy, records) = match &state.guard {
        Some(guard) => (guard.policy_name(), guard.snapshot()),
        None => ("none", Vec::new()),
    };
    Json(TrafficSummary {
        policy,
        default_freq: state.policies.default_freq(),
        groups: state.policies.groups(),
        records,
    })
}
