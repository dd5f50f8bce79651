//! In-memory stand-ins for the build tool and the cluster, used to drive the
//! orchestrator deterministically (pair with `start_paused` tokio tests).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::builder::Builder;
use crate::cluster::ClusterClient;
use crate::error::{Result, StackupError};
use crate::graph::Service;
use crate::types::{ClusterStatus, FailureCause};

// ─── FakeBuilder ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBuilder {
    failing: HashSet<String>,
    failing_loads: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    loads: Mutex<Vec<String>>,
}

impl FakeBuilder {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_loads(names: &[&str]) -> Self {
        Self {
            failing_loads: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every build takes `delay` before it resolves.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

impl Builder for FakeBuilder {
    async fn build(&self, service: &Service) -> Result<()> {
        self.calls.lock().unwrap().push(service.name.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&service.name) {
            return Err(StackupError::CommandFailed {
                command: format!("docker build -t {}", service.name),
                code: "1".into(),
                stderr: "COPY failed: no such file".into(),
            });
        }
        Ok(())
    }

    async fn load(&self, service: &Service) -> Result<()> {
        self.loads.lock().unwrap().push(service.name.clone());
        if self.failing_loads.contains(&service.name) {
            return Err(StackupError::CommandFailed {
                command: format!("minikube image load {}", service.name),
                code: "1".into(),
                stderr: "image not present in local daemon".into(),
            });
        }
        Ok(())
    }
}

// ─── FakeCluster ──────────────────────────────────────────────────────────

/// How a submitted resource's status evolves after its first apply.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    ReadyAfter(Duration),
    NeverReady,
    FailAfter(Duration, FailureCause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    EnsureNamespace(String),
    DeleteNamespace(String),
    Apply(String),
    ApplyManifest(PathBuf),
    Exec(String),
    Restart(String),
}

struct Submission {
    first_applied: Instant,
    count: usize,
}

struct Inner {
    namespaces: HashSet<String>,
    submissions: HashMap<String, Submission>,
    behaviors: HashMap<String, Behavior>,
    events: Vec<Event>,
    apply_times: Vec<(String, Duration)>,
    fail_apply: HashSet<String>,
    hung_applies: HashSet<String>,
    fail_namespace_ops: bool,
    hang_namespace_ops: bool,
    failing_hooks: HashSet<String>,
    hung_hooks: HashSet<String>,
    failing_queries: HashMap<String, usize>,
    hung: HashSet<String>,
    queries: HashMap<String, usize>,
    access_url: Option<String>,
}

pub struct FakeCluster {
    epoch: Instant,
    inner: Mutex<Inner>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            inner: Mutex::new(Inner {
                namespaces: HashSet::new(),
                submissions: HashMap::new(),
                behaviors: HashMap::new(),
                events: Vec::new(),
                apply_times: Vec::new(),
                fail_apply: HashSet::new(),
                hung_applies: HashSet::new(),
                fail_namespace_ops: false,
                hang_namespace_ops: false,
                failing_hooks: HashSet::new(),
                hung_hooks: HashSet::new(),
                failing_queries: HashMap::new(),
                hung: HashSet::new(),
                queries: HashMap::new(),
                access_url: None,
            }),
        }
    }
}

impl FakeCluster {
    pub fn set_behavior(&self, name: &str, behavior: Behavior) {
        self.inner
            .lock()
            .unwrap()
            .behaviors
            .insert(name.to_string(), behavior);
    }

    pub fn fail_apply(&self, name: &str) {
        self.inner.lock().unwrap().fail_apply.insert(name.to_string());
    }

    /// Submissions of `name` never return.
    pub fn hang_apply(&self, name: &str) {
        self.inner.lock().unwrap().hung_applies.insert(name.to_string());
    }

    pub fn fail_namespace_ops(&self) {
        self.inner.lock().unwrap().fail_namespace_ops = true;
    }

    /// Namespace creation and deletion never return.
    pub fn hang_namespace_ops(&self) {
        self.inner.lock().unwrap().hang_namespace_ops = true;
    }

    /// Hooks targeting `target` (a workload, or a manifest path) fail.
    pub fn fail_hook(&self, target: &str) {
        self.inner.lock().unwrap().failing_hooks.insert(target.to_string());
    }

    /// Hooks targeting `target` never return.
    pub fn hang_hook(&self, target: &str) {
        self.inner.lock().unwrap().hung_hooks.insert(target.to_string());
    }

    /// The next `count` status queries for `name` return an error.
    pub fn fail_status_queries(&self, name: &str, count: usize) {
        self.inner
            .lock()
            .unwrap()
            .failing_queries
            .insert(name.to_string(), count);
    }

    /// Status queries for `name` never return.
    pub fn hang_status(&self, name: &str) {
        self.inner.lock().unwrap().hung.insert(name.to_string());
    }

    pub fn set_access_url(&self, url: &str) {
        self.inner.lock().unwrap().access_url = Some(url.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.inner.lock().unwrap().namespaces.contains(namespace)
    }

    pub fn is_applied(&self, name: &str) -> bool {
        self.inner.lock().unwrap().submissions.contains_key(name)
    }

    pub fn apply_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .submissions
            .get(name)
            .map_or(0, |s| s.count)
    }

    /// Time since the fake was created at which `name` was first submitted.
    pub fn applied_at(&self, name: &str) -> Option<Duration> {
        self.inner
            .lock()
            .unwrap()
            .apply_times
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn status_queries(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queries
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn current_status(&self, name: &str) -> Result<ClusterStatus> {
        let mut inner = self.inner.lock().unwrap();
        *inner.queries.entry(name.to_string()).or_default() += 1;

        if let Some(remaining) = inner.failing_queries.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StackupError::CommandFailed {
                    command: format!("kubectl get deployment {name}"),
                    code: "1".into(),
                    stderr: "connection refused".into(),
                });
            }
        }

        let Some(sub) = inner.submissions.get(name) else {
            return Ok(ClusterStatus::NotFound);
        };
        let age = sub.first_applied.elapsed();
        let behavior = inner
            .behaviors
            .get(name)
            .copied()
            .unwrap_or(Behavior::ReadyAfter(Duration::ZERO));

        Ok(match behavior {
            Behavior::ReadyAfter(d) if age >= d => ClusterStatus::Ready,
            Behavior::FailAfter(d, cause) if age >= d => ClusterStatus::Failed {
                cause,
                message: match cause {
                    FailureCause::Rollout => "ProgressDeadlineExceeded".into(),
                    FailureCause::ImageUnavailable => {
                        format!("{name}: ErrImageNeverPull")
                    }
                },
            },
            _ => ClusterStatus::Progressing,
        })
    }
}

impl FakeCluster {
    /// Record a hook event, then hang or fail as scripted for `target`.
    async fn hook(&self, event: Event, target: &str) -> Result<()> {
        let (fail, hang) = {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(event);
            (
                inner.failing_hooks.contains(target),
                inner.hung_hooks.contains(target),
            )
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(StackupError::CommandFailed {
                command: format!("kubectl hook {target}"),
                code: "1".into(),
                stderr: "error: unable to upgrade connection".into(),
            });
        }
        Ok(())
    }

    async fn namespace_op(&self, event: Event, command: &str) -> Result<()> {
        let (fail, hang) = {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(event);
            (inner.fail_namespace_ops, inner.hang_namespace_ops)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(StackupError::CommandFailed {
                command: command.into(),
                code: "1".into(),
                stderr: "forbidden".into(),
            });
        }
        Ok(())
    }
}

impl ClusterClient for FakeCluster {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.namespace_op(Event::EnsureNamespace(namespace.to_string()), "kubectl apply -f -")
            .await?;
        self.inner.lock().unwrap().namespaces.insert(namespace.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespace_op(Event::DeleteNamespace(namespace.to_string()), "kubectl delete ns")
            .await?;
        let mut inner = self.inner.lock().unwrap();
        inner.namespaces.remove(namespace);
        inner.submissions.clear();
        Ok(())
    }

    async fn apply(&self, _namespace: &str, service: &Service) -> Result<()> {
        let hung = {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(Event::Apply(service.name.clone()));
            inner.hung_applies.contains(&service.name)
        };
        if hung {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.fail_apply.contains(&service.name) {
            return Err(StackupError::CommandFailed {
                command: format!("kubectl apply -f {}", service.manifest.display()),
                code: "1".into(),
                stderr: "admission webhook denied the request".into(),
            });
        }
        let at = self.epoch.elapsed();
        let now = Instant::now();
        let sub = inner
            .submissions
            .entry(service.name.clone())
            .or_insert(Submission {
                first_applied: now,
                count: 0,
            });
        sub.count += 1;
        if sub.count == 1 {
            inner.apply_times.push((service.name.clone(), at));
        }
        Ok(())
    }

    async fn apply_manifest(&self, _namespace: &str, manifest: &Path) -> Result<()> {
        let target = manifest.display().to_string();
        self.hook(Event::ApplyManifest(manifest.to_path_buf()), &target)
            .await
    }

    async fn status(&self, _namespace: &str, service: &Service) -> Result<ClusterStatus> {
        let hung = self.inner.lock().unwrap().hung.contains(&service.name);
        if hung {
            std::future::pending::<()>().await;
        }
        self.current_status(&service.name)
    }

    async fn exec(&self, _namespace: &str, workload: &str, _command: &[String]) -> Result<()> {
        self.hook(Event::Exec(workload.to_string()), workload).await
    }

    async fn restart(&self, _namespace: &str, workload: &str, _timeout: Duration) -> Result<()> {
        self.hook(Event::Restart(workload.to_string()), workload).await
    }

    async fn access_url(&self, _namespace: &str, _service: &Service) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().access_url.clone())
    }
}
