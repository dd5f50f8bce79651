//! Tier-wide readiness barrier.
//!
//! Each service is tracked by its own [`ReadinessState`] machine, polled on a
//! fixed interval against one wall-clock deadline shared by the whole tier.
//! A service that reports an error resolves early; the rest keep polling.
//! When the deadline passes, every unresolved service becomes
//! `Failed(timeout)`.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::cluster::ClusterClient;
use crate::graph::Service;
use crate::types::{ReadinessState, Tier};

/// Stand-in for "no deadline" when a timeout does not fit on the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `start + by`, saturating at a point decades away instead of overflowing.
fn deadline_after(start: Instant, by: Duration) -> Instant {
    start
        .checked_add(by)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReadiness {
    pub name: String,
    pub state: ReadinessState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierReadiness {
    pub tier: Tier,
    pub services: Vec<ServiceReadiness>,
    #[serde(serialize_with = "crate::result::serialize_secs")]
    pub elapsed: Duration,
}

impl TierReadiness {
    pub fn all_ready(&self) -> bool {
        self.services.iter().all(|s| s.state.is_ready())
    }

    pub fn not_ready(&self) -> impl Iterator<Item = &ServiceReadiness> {
        self.services.iter().filter(|s| !s.state.is_ready())
    }
}

pub struct ReadinessWaiter<'a, C> {
    client: &'a C,
    namespace: &'a str,
    interval: Duration,
}

impl<'a, C: ClusterClient> ReadinessWaiter<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str, interval: Duration) -> Self {
        Self {
            client,
            namespace,
            interval,
        }
    }

    pub async fn wait_until_ready(
        &self,
        tier: Tier,
        services: &[Service],
        timeout: Duration,
    ) -> TierReadiness {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        tracing::info!(%tier, services = services.len(), timeout_secs = timeout.as_secs(), "waiting for readiness");

        let services = join_all(services.iter().map(|s| self.watch(s, deadline))).await;

        let readiness = TierReadiness {
            tier,
            services,
            elapsed: started.elapsed(),
        };
        if readiness.all_ready() {
            tracing::info!(%tier, elapsed_secs = readiness.elapsed.as_secs_f64(), "tier ready");
        } else {
            let pending: Vec<&str> = readiness.not_ready().map(|s| s.name.as_str()).collect();
            tracing::warn!(%tier, not_ready = ?pending, "tier did not become ready");
        }
        readiness
    }

    async fn watch(&self, service: &Service, deadline: Instant) -> ServiceReadiness {
        let mut state = ReadinessState::Pending;
        loop {
            match tokio::time::timeout_at(deadline, self.client.status(self.namespace, service))
                .await
            {
                Ok(Ok(status)) => {
                    let next = state.observe(&status);
                    if next != state {
                        tracing::debug!(service = %service.name, from = %state, to = %next, "readiness transition");
                    }
                    state = next;
                }
                // A failed query is not a cluster-reported failure; keep polling
                // until the deadline decides.
                Ok(Err(e)) => {
                    tracing::warn!(service = %service.name, error = %e, "status query failed")
                }
                Err(_) => {
                    tracing::debug!(service = %service.name, "status query cut off by deadline")
                }
            }

            if state.is_terminal() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                state = state.expire();
                break;
            }
            tokio::time::sleep_until(deadline_after(now, self.interval).min(deadline)).await;
        }

        match &state {
            ReadinessState::Ready => tracing::info!(service = %service.name, "ready"),
            other => tracing::warn!(service = %service.name, state = %other, "not ready"),
        }
        ServiceReadiness {
            name: service.name.clone(),
            state,
        }
    }
}
