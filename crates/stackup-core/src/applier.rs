use std::time::Duration;

use futures::future::join_all;

use crate::cluster::ClusterClient;
use crate::error::{Result, StackupError};
use crate::graph::Service;

/// Outcome of submitting one tier. Successful submissions are kept even
/// when a sibling fails: nothing is rolled back.
#[derive(Debug, Default)]
pub struct TierApply {
    pub applied: Vec<String>,
    pub errors: Vec<StackupError>,
}

impl TierApply {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Submits service manifests. A submission that has not returned after
/// `timeout` counts as failed.
pub struct ManifestApplier<'a, C> {
    client: &'a C,
    namespace: &'a str,
    timeout: Duration,
}

impl<'a, C: ClusterClient> ManifestApplier<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str, timeout: Duration) -> Self {
        Self {
            client,
            namespace,
            timeout,
        }
    }

    pub async fn apply(&self, service: &Service) -> Result<()> {
        tracing::info!(
            service = %service.name,
            manifest = %service.manifest.display(),
            "applying manifest"
        );
        let submit = self.client.apply(self.namespace, service);
        match tokio::time::timeout(self.timeout, submit).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ StackupError::Apply { .. })) => Err(e),
            Ok(Err(other)) => Err(StackupError::Apply {
                service: service.name.clone(),
                message: other.to_string(),
            }),
            Err(_) => Err(StackupError::Apply {
                service: service.name.clone(),
                message: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    /// Submit every service of a tier concurrently and wait for all
    /// submissions to return.
    pub async fn apply_tier(&self, services: &[Service]) -> TierApply {
        let results = join_all(services.iter().map(|s| async move {
            (s.name.clone(), self.apply(s).await)
        }))
        .await;

        let mut outcome = TierApply::default();
        for (name, result) in results {
            match result {
                Ok(()) => outcome.applied.push(name),
                Err(e) => {
                    tracing::warn!(service = %name, error = %e, "apply failed");
                    outcome.errors.push(e);
                }
            }
        }
        outcome
    }
}
