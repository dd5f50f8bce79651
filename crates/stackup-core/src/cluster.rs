use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::graph::Service;
use crate::types::ClusterStatus;

/// Narrow view of the cluster control plane the orchestrator depends on.
///
/// `apply` and `apply_manifest` must be declarative upserts: submitting an
/// unchanged manifest a second time leaves the cluster as the first
/// submission did. `delete_namespace` must treat an absent namespace as
/// success.
pub trait ClusterClient {
    fn ensure_namespace(&self, namespace: &str) -> impl Future<Output = Result<()>>;

    fn delete_namespace(&self, namespace: &str) -> impl Future<Output = Result<()>>;

    fn apply(&self, namespace: &str, service: &Service) -> impl Future<Output = Result<()>>;

    /// Submit a manifest that belongs to no service (config maps, secrets).
    fn apply_manifest(&self, namespace: &str, manifest: &Path)
        -> impl Future<Output = Result<()>>;

    fn status(
        &self,
        namespace: &str,
        service: &Service,
    ) -> impl Future<Output = Result<ClusterStatus>>;

    /// Run `command` inside a running pod of `workload` (`kind/name`, or a
    /// bare deployment name).
    fn exec(
        &self,
        namespace: &str,
        workload: &str,
        command: &[String],
    ) -> impl Future<Output = Result<()>>;

    /// Restart `workload` and return once its new rollout has finished or
    /// `timeout` has passed.
    fn restart(
        &self,
        namespace: &str,
        workload: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>>;

    /// Externally reachable address of `service`, if the cluster exposes one.
    fn access_url(
        &self,
        namespace: &str,
        service: &Service,
    ) -> impl Future<Output = Result<Option<String>>>;
}
