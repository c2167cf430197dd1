//! Load simulation against a shared limiter.
//!
//! Spawns one task per client, each issuing a fixed number of requests with
//! a pause between them, and tallies the decisions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ratelimit::RateLimiter;

/// What to simulate.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// Client identifiers, one task each
    pub clients: Vec<String>,
    /// Requests issued by each client
    pub requests_per_client: usize,
    /// Pause between a client's consecutive requests
    pub interval: Duration,
}

impl SimulationPlan {
    /// A plan with `count` clients named `{prefix}_{n}`.
    pub fn numbered(prefix: &str, count: usize, requests_per_client: usize, interval: Duration) -> Self {
        Self {
            clients: (0..count).map(|n| format!("{}_{}", prefix, n)).collect(),
            requests_per_client,
            interval,
        }
    }
}

/// Decisions observed for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientTally {
    pub allowed: usize,
    pub rejected: usize,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub clients: BTreeMap<String, ClientTally>,
}

impl SimulationReport {
    /// Requests admitted across all clients.
    pub fn total_allowed(&self) -> usize {
        self.clients.values().map(|t| t.allowed).sum()
    }

    /// Requests rejected across all clients.
    pub fn total_rejected(&self) -> usize {
        self.clients.values().map(|t| t.rejected).sum()
    }
}

/// Run `plan` against `limiter` and collect the decisions.
pub async fn simulate(limiter: Arc<dyn RateLimiter<String>>, plan: SimulationPlan) -> SimulationReport {
    let report = Arc::new(Mutex::new(SimulationReport::default()));

    info!(
        kind = %limiter.kind(),
        clients = plan.clients.len(),
        requests_per_client = plan.requests_per_client,
        interval_ms = plan.interval.as_millis() as u64,
        "Starting simulation"
    );

    let tasks = plan.clients.into_iter().map(|client| {
        let limiter = limiter.clone();
        let report = report.clone();
        let requests = plan.requests_per_client;
        let interval = plan.interval;

        tokio::spawn(async move {
            for n in 0..requests {
                if n > 0 && !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }

                let allowed = limiter.allow(&client);
                debug!(client = %client, request = n, allowed, "Decision");

                let mut guard = report.lock();
                let tally = guard.clients.entry(client.clone()).or_default();
                if allowed {
                    tally.allowed += 1;
                } else {
                    tally.rejected += 1;
                }
            }
        })
    });

    for result in join_all(tasks).await {
        if let Err(e) = result {
            warn!(error = %e, "Simulation task failed");
        }
    }

    let report = report.lock().clone();
    info!(
        allowed = report.total_allowed(),
        rejected = report.total_rejected(),
        tracked_clients = limiter.tracked_clients(),
        "Simulation finished"
    );
    report
}
