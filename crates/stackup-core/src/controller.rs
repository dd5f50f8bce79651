//! Runs an [`ExecutionPlan`] to completion and assembles the
//! [`DeploymentResult`].
//!
//! Steps execute strictly in plan order, against the plan's namespace. A
//! step that fails halts the run; nothing after it starts and nothing before
//! it is rolled back. Every step is bounded by a configured timeout and races
//! the cancellation signal, and dropping an interrupted step kills the child
//! processes it owns.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::applier::ManifestApplier;
use crate::builder::{Builder, ImageBuilder};
use crate::cluster::ClusterClient;
use crate::config::{Config, TimeoutConfig};
use crate::error::{FailureCategory, StackupError};
use crate::graph::{Service, ServiceGraph};
use crate::hooks::HookRunner;
use crate::namespace::NamespaceManager;
use crate::plan::{ExecutionPlan, Step};
use crate::result::{DeploymentResult, Outcome, ServiceReport};
use crate::types::{FailureKind, Mode, ReadinessState, Tier};
use crate::waiter::{ReadinessWaiter, TierReadiness};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Receiving half of a run's cancellation channel.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending half; `cancel()` interrupts every run holding a paired signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

pub fn cancel_channel() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = cancel_channel();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub namespace: String,
    pub entrypoint: Option<String>,
    pub poll_interval: Duration,
    pub build_parallelism: usize,
    pub timeouts: TimeoutConfig,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.namespace.clone(),
            entrypoint: config.entrypoint.clone(),
            poll_interval: config.poll_interval(),
            build_parallelism: config.build_parallelism,
            timeouts: config.timeouts.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Why a run stopped before its last step.
enum Halt {
    Failed(FailureCategory, String),
    Cancelled,
}

impl From<StackupError> for Halt {
    fn from(e: StackupError) -> Self {
        Halt::Failed(e.category(), e.to_string())
    }
}

/// Per-service progress, kept in graph order.
struct Ledger {
    reports: Vec<ServiceReport>,
    access_url: Option<String>,
}

impl Ledger {
    fn new(graph: &ServiceGraph) -> Self {
        Self {
            reports: graph
                .services()
                .map(|s| ServiceReport {
                    name: s.name.clone(),
                    tier: s.tier,
                    built: false,
                    loaded: false,
                    applied: false,
                    state: ReadinessState::Pending,
                    error: None,
                })
                .collect(),
            access_url: None,
        }
    }

    fn entry(&mut self, name: &str) -> Option<&mut ServiceReport> {
        self.reports.iter_mut().find(|r| r.name == name)
    }

    fn record_error(&mut self, name: &str, message: String) {
        if let Some(r) = self.entry(name) {
            r.error = Some(message);
        }
    }

    fn mark(&mut self, names: &[String], set: impl Fn(&mut ServiceReport)) {
        for name in names {
            if let Some(r) = self.entry(name) {
                set(r);
            }
        }
    }

    fn record_readiness(&mut self, readiness: &TierReadiness) {
        for s in &readiness.services {
            if let Some(r) = self.entry(&s.name) {
                r.state = s.state.clone();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ModeController
// ---------------------------------------------------------------------------

pub struct ModeController<'a, B, C> {
    graph: &'a ServiceGraph,
    builder: &'a B,
    cluster: &'a C,
    settings: Settings,
}

impl<'a, B: Builder, C: ClusterClient> ModeController<'a, B, C> {
    pub fn new(graph: &'a ServiceGraph, builder: &'a B, cluster: &'a C, settings: Settings) -> Self {
        Self {
            graph,
            builder,
            cluster,
            settings,
        }
    }

    pub fn plan(&self, mode: Mode) -> ExecutionPlan {
        ExecutionPlan::new(
            mode,
            &self.settings.namespace,
            self.graph,
            &self.settings.timeouts,
            self.settings.entrypoint.as_deref(),
        )
    }

    /// Plan and execute one invocation.
    pub async fn run(&self, mode: Mode, cancel: CancelSignal) -> DeploymentResult {
        let plan = self.plan(mode);
        self.execute(&plan, cancel).await
    }

    pub async fn execute(&self, plan: &ExecutionPlan, mut cancel: CancelSignal) -> DeploymentResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut ledger = Ledger::new(self.graph);
        let total = plan.steps.len();

        tracing::info!(mode = %plan.mode, namespace = %plan.namespace, steps = total, "starting run");

        let mut outcome = Outcome::Succeeded;
        for (i, step) in plan.steps.iter().enumerate() {
            tracing::info!("step {}/{}: {}", i + 1, total, step);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Halt::Cancelled),
                r = self.run_step(step, &plan.namespace, &mut ledger) => r,
            };
            match result {
                Ok(()) => {}
                Err(Halt::Cancelled) => {
                    tracing::warn!(step = %step, "run cancelled");
                    outcome = Outcome::Cancelled;
                    break;
                }
                Err(Halt::Failed(category, message)) => {
                    tracing::error!(step = %step, %category, "{message}");
                    outcome = Outcome::Failed { category, message };
                    break;
                }
            }
        }

        let result = DeploymentResult {
            namespace: plan.namespace.clone(),
            mode: plan.mode,
            outcome,
            services: ledger.reports,
            started_at,
            elapsed: clock.elapsed(),
            access_url: ledger.access_url,
        };
        tracing::info!(
            outcome = ?result.outcome,
            elapsed_secs = result.elapsed.as_secs_f64(),
            "run finished"
        );
        result
    }

    async fn run_step(
        &self,
        step: &Step,
        namespace: &str,
        ledger: &mut Ledger,
    ) -> Result<(), Halt> {
        let timeouts = &self.settings.timeouts;
        match step {
            Step::EnsureNamespace => {
                NamespaceManager::new(self.cluster, namespace, timeouts.namespace())
                    .ensure()
                    .await?;
            }
            Step::DeleteNamespace => {
                NamespaceManager::new(self.cluster, namespace, timeouts.namespace())
                    .delete()
                    .await?;
            }
            Step::Build { services, .. } => {
                let targets = self.resolve(services);
                match self.images().build_all(&targets).await {
                    Ok(built) => ledger.mark(&built, |r| r.built = true),
                    Err(e) => return Err(record_build_failure(ledger, e)),
                }
            }
            Step::LoadImages { services, .. } => {
                let targets = self.resolve(services);
                match self.images().load_all(&targets).await {
                    Ok(loaded) => ledger.mark(&loaded, |r| r.loaded = true),
                    Err(e) => return Err(record_build_failure(ledger, e)),
                }
            }
            Step::Hook { tier, stage, hook } => {
                HookRunner::new(self.cluster, namespace, timeouts.hook())
                    .run(*tier, *stage, hook)
                    .await?;
            }
            Step::Apply { tier, services } => {
                let targets = self.resolve(services);
                let outcome = ManifestApplier::new(self.cluster, namespace, timeouts.apply())
                    .apply_tier(&targets)
                    .await;
                ledger.mark(&outcome.applied, |r| r.applied = true);
                if !outcome.succeeded() {
                    let mut failed = Vec::new();
                    for e in &outcome.errors {
                        if let StackupError::Apply { service, message } = e {
                            ledger.record_error(service, message.clone());
                            failed.push(service.as_str());
                        }
                    }
                    return Err(Halt::Failed(
                        FailureCategory::Apply,
                        format!("{tier} tier: apply failed for {}", failed.join(", ")),
                    ));
                }
            }
            Step::Wait {
                tier,
                services,
                timeout,
            } => {
                let targets = self.resolve(services);
                let waiter =
                    ReadinessWaiter::new(self.cluster, namespace, self.settings.poll_interval);
                let readiness = waiter.wait_until_ready(*tier, &targets, *timeout).await;
                ledger.record_readiness(&readiness);
                if !readiness.all_ready() {
                    return Err(readiness_halt(*tier, &readiness));
                }
            }
            Step::ReportAccess { service } => {
                let Some(svc) = self.graph.get(service) else {
                    return Ok(());
                };
                match self.cluster.access_url(namespace, svc).await {
                    Ok(Some(url)) => {
                        tracing::info!(service = %service, %url, "access URL");
                        ledger.access_url = Some(url);
                    }
                    Ok(None) => tracing::info!(service = %service, "no external address exposed"),
                    Err(e) => {
                        tracing::warn!(service = %service, error = %e, "could not resolve access URL")
                    }
                }
            }
        }
        Ok(())
    }

    fn images(&self) -> ImageBuilder<'_, B> {
        ImageBuilder::new(
            self.builder,
            self.settings.build_parallelism,
            self.settings.timeouts.build(),
        )
    }

    fn resolve(&self, names: &[String]) -> Vec<Service> {
        names
            .iter()
            .filter_map(|n| self.graph.get(n).cloned())
            .collect()
    }
}

fn record_build_failure(ledger: &mut Ledger, e: StackupError) -> Halt {
    if let StackupError::Build { service, message } = &e {
        ledger.record_error(service, message.clone());
    }
    e.into()
}

/// An unready tier is a readiness failure, unless the cluster could not pull
/// an image: that is a submission problem and is reported as such.
fn readiness_halt(tier: Tier, readiness: &TierReadiness) -> Halt {
    let image_failures: Vec<String> = readiness
        .services
        .iter()
        .filter_map(|s| match &s.state {
            ReadinessState::Failed {
                failure: FailureKind::ImageUnavailable(msg),
            } => Some(format!("{} ({msg})", s.name)),
            _ => None,
        })
        .collect();
    if !image_failures.is_empty() {
        return Halt::Failed(
            FailureCategory::Apply,
            format!("{tier} tier: image unavailable for {}", image_failures.join(", ")),
        );
    }

    let not_ready: Vec<String> = readiness
        .not_ready()
        .map(|s| format!("{} {}", s.name, s.state.label()))
        .collect();
    Halt::Failed(
        FailureCategory::Readiness,
        format!("{tier} tier not ready: {}", not_ready.join(", ")),
    )
}
