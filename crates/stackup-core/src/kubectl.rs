//! [`ClusterClient`] backed by the `kubectl` and `minikube` CLIs.
//!
//! Workload status is read with `kubectl get -o json` and judged from the
//! rollout fields (`observedGeneration`, replica counters, conditions).
//! While a workload is not yet ready its pods are inspected too, so a
//! container stuck on an image pull resolves immediately instead of waiting
//! out the tier deadline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cluster::ClusterClient;
use crate::error::{Result, StackupError};
use crate::exec::Cmd;
use crate::graph::{ResourceKind, Service};
use crate::types::{ClusterStatus, FailureCause};

/// Container waiting reasons that mean the image will never arrive on its own.
const IMAGE_PULL_REASONS: &[&str] = &[
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "ErrImageNeverPull",
];

/// `minikube service --url` can hang on tunnelling drivers.
const ACCESS_URL_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side bound on single API requests. Streaming calls (`exec`,
/// `rollout status`) and `delete --wait` go without it and are bounded by
/// the caller instead.
const REQUEST_TIMEOUT: &str = "--request-timeout=30s";

#[derive(Debug, Clone)]
pub struct KubectlClient {
    kubectl: PathBuf,
    minikube: Option<PathBuf>,
}

impl KubectlClient {
    pub fn new(kubectl: PathBuf, minikube: Option<PathBuf>) -> Self {
        Self { kubectl, minikube }
    }

    fn kubectl(&self) -> Cmd {
        Cmd::new(&self.kubectl)
    }

    /// `kubectl` for a single request/response call.
    fn request(&self) -> Cmd {
        self.kubectl().arg(REQUEST_TIMEOUT)
    }

    async fn workload(&self, namespace: &str, service: &Service) -> Result<Option<Workload>> {
        let check = &service.readiness;
        let cmd = self
            .request()
            .args(["get", check.kind.as_str(), check.name.as_str(), "-n", namespace, "-o", "json"]);
        let out = cmd.output(None).await?;
        if !out.success() {
            if is_not_found(&out.stderr) {
                return Ok(None);
            }
            return Err(StackupError::CommandFailed {
                command: cmd.display(),
                code: out.code.map_or_else(|| "signal".into(), |c| c.to_string()),
                stderr: out.stderr.trim().to_string(),
            });
        }
        serde_json::from_str(&out.stdout)
            .map(Some)
            .map_err(|e| StackupError::Status {
                resource: format!("{}/{}", check.kind.as_str(), check.name),
                message: e.to_string(),
            })
    }

    async fn image_pull_failure(&self, namespace: &str, service: &Service) -> Result<Option<String>> {
        let selector = service.readiness.selector.as_str();
        if selector.trim().is_empty() {
            return Ok(None);
        }
        let cmd = self
            .request()
            .args(["get", "pods", "-n", namespace, "-l", selector, "-o", "json"]);
        let stdout = cmd.output(None).await?.checked(&cmd)?;
        let pods: PodList = serde_json::from_str(&stdout).map_err(|e| StackupError::Status {
            resource: format!("pods -l {selector}"),
            message: e.to_string(),
        })?;
        Ok(pods.image_pull_failure())
    }

    async fn submit(&self, namespace: &str, manifest: &Path) -> Result<String> {
        let cmd = self
            .request()
            .args(["apply", "-n", namespace, "-f"])
            .arg(manifest);
        cmd.output(None).await?.checked(&cmd)
    }
}

impl ClusterClient for KubectlClient {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        // Render then apply, so an existing namespace is not an error.
        let render = self
            .kubectl()
            .args(["create", "namespace", namespace, "--dry-run=client", "-o", "yaml"]);
        let manifest = render.output(None).await?.checked(&render)?;
        let apply = self.request().args(["apply", "-f", "-"]);
        apply.output(Some(manifest.as_str())).await?.checked(&apply)?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let cmd = self.kubectl().args([
            "delete",
            "namespace",
            namespace,
            "--ignore-not-found=true",
            "--wait=true",
        ]);
        let stdout = cmd.output(None).await?.checked(&cmd)?;
        if stdout.trim().is_empty() {
            tracing::info!(%namespace, "namespace did not exist");
        }
        Ok(())
    }

    async fn apply(&self, namespace: &str, service: &Service) -> Result<()> {
        let stdout = self.submit(namespace, &service.manifest).await?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(service = %service.name, "{line}");
        }
        Ok(())
    }

    async fn apply_manifest(&self, namespace: &str, manifest: &Path) -> Result<()> {
        let stdout = self.submit(namespace, manifest).await?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(manifest = %manifest.display(), "{line}");
        }
        Ok(())
    }

    async fn exec(&self, namespace: &str, workload: &str, command: &[String]) -> Result<()> {
        let cmd = self
            .kubectl()
            .args(["exec", "-n", namespace])
            .arg(workload_ref(workload))
            .arg("--")
            .args(command);
        let stdout = cmd.output(None).await?.checked(&cmd)?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(%workload, "{line}");
        }
        Ok(())
    }

    async fn restart(&self, namespace: &str, workload: &str, timeout: Duration) -> Result<()> {
        let target = workload_ref(workload);
        let restart = self
            .request()
            .args(["rollout", "restart", "-n", namespace, target.as_str()]);
        restart.output(None).await?.checked(&restart)?;

        let wait = self
            .kubectl()
            .args(["rollout", "status", "-n", namespace, target.as_str()])
            .arg(format!("--timeout={}s", timeout.as_secs()));
        wait.output(None).await?.checked(&wait)?;
        tracing::info!(%workload, "restarted");
        Ok(())
    }

    async fn status(&self, namespace: &str, service: &Service) -> Result<ClusterStatus> {
        let Some(workload) = self.workload(namespace, service).await? else {
            return Ok(ClusterStatus::NotFound);
        };
        let status = workload.evaluate(service.readiness.kind);
        if status != ClusterStatus::Progressing {
            return Ok(status);
        }
        match self.image_pull_failure(namespace, service).await {
            Ok(Some(message)) => Ok(ClusterStatus::Failed {
                cause: FailureCause::ImageUnavailable,
                message,
            }),
            Ok(None) => Ok(status),
            // The workload itself was readable; a failed pod listing is not
            // worth failing the query over.
            Err(e) => {
                tracing::debug!(service = %service.name, error = %e, "pod listing failed");
                Ok(status)
            }
        }
    }

    async fn access_url(&self, namespace: &str, service: &Service) -> Result<Option<String>> {
        let Some(minikube) = &self.minikube else {
            return Ok(None);
        };
        let cmd = Cmd::new(minikube).args(["service", "-n", namespace, service.name.as_str(), "--url"]);
        let out = match tokio::time::timeout(ACCESS_URL_TIMEOUT, cmd.output(None)).await {
            Ok(out) => out?,
            Err(_) => {
                tracing::warn!(command = %cmd.display(), "timed out resolving access URL");
                return Ok(None);
            }
        };
        let stdout = out.checked(&cmd)?;
        Ok(first_url(&stdout))
    }
}

/// `kind/name` as written, or a bare name taken as a deployment.
fn workload_ref(workload: &str) -> String {
    if workload.contains('/') {
        workload.to_string()
    } else {
        format!("deployment/{workload}")
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

fn first_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("http://") || l.starts_with("https://"))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Status payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Workload {
    metadata: WorkloadMeta,
    spec: WorkloadSpec,
    status: WorkloadStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkloadMeta {
    generation: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkloadSpec {
    replicas: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WorkloadStatus {
    observed_generation: i64,
    replicas: i32,
    updated_replicas: i32,
    ready_replicas: i32,
    available_replicas: i32,
    conditions: Vec<Condition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
    reason: String,
    message: String,
}

impl Workload {
    fn evaluate(&self, kind: ResourceKind) -> ClusterStatus {
        let st = &self.status;

        for c in &st.conditions {
            let failed = (c.kind == "Progressing" && c.reason == "ProgressDeadlineExceeded")
                || (c.kind == "ReplicaFailure" && c.status == "True");
            if failed {
                return ClusterStatus::Failed {
                    cause: FailureCause::Rollout,
                    message: format!("{}: {}", c.reason, c.message),
                };
            }
        }

        if st.observed_generation < self.metadata.generation {
            return ClusterStatus::Progressing;
        }

        let desired = self.spec.replicas.unwrap_or(1);
        let ready = match kind {
            ResourceKind::Deployment => {
                st.updated_replicas >= desired
                    && st.available_replicas >= desired
                    && st.replicas <= st.updated_replicas
            }
            ResourceKind::Statefulset => {
                st.ready_replicas >= desired && st.updated_replicas >= desired
            }
        };
        if ready {
            ClusterStatus::Ready
        } else {
            ClusterStatus::Progressing
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodList {
    items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pod {
    metadata: PodMeta,
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodStatus {
    init_container_statuses: Vec<ContainerStatus>,
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerStatus {
    name: String,
    image: String,
    state: ContainerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerState {
    waiting: Option<Waiting>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Waiting {
    reason: String,
    message: String,
}

impl PodList {
    fn image_pull_failure(&self) -> Option<String> {
        self.items.iter().find_map(|pod| {
            pod.status
                .init_container_statuses
                .iter()
                .chain(&pod.status.container_statuses)
                .find_map(|c| {
                    let waiting = c.state.waiting.as_ref()?;
                    IMAGE_PULL_REASONS
                        .contains(&waiting.reason.as_str())
                        .then(|| {
                            format!(
                                "pod {} container {} ({}): {}",
                                pod.metadata.name, c.name, c.image, waiting.reason
                            )
                        })
                })
        })
    }
}
