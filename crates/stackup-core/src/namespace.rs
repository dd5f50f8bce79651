use std::future::Future;
use std::time::Duration;

use crate::cluster::ClusterClient;
use crate::error::{Result, StackupError};

/// Owns the isolation scope of one run. Each operation is cut off after
/// `timeout`; a namespace stuck on a finalizer fails instead of hanging.
pub struct NamespaceManager<'a, C> {
    client: &'a C,
    namespace: &'a str,
    timeout: Duration,
}

impl<'a, C: ClusterClient> NamespaceManager<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str, timeout: Duration) -> Self {
        Self {
            client,
            namespace,
            timeout,
        }
    }

    /// Create the namespace if it does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tracing::info!(namespace = %self.namespace, "ensuring namespace");
        self.bounded("create", self.client.ensure_namespace(self.namespace))
            .await
    }

    /// Delete the namespace and everything in it. Absent is success.
    pub async fn delete(&self) -> Result<()> {
        tracing::info!(namespace = %self.namespace, "deleting namespace");
        self.bounded("delete", self.client.delete_namespace(self.namespace))
            .await
    }

    async fn bounded(&self, action: &str, work: impl Future<Output = Result<()>>) -> Result<()> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result.map_err(|e| self.wrap(e)),
            Err(_) => Err(StackupError::Namespace {
                namespace: self.namespace.to_string(),
                message: format!("{action} timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    fn wrap(&self, err: StackupError) -> StackupError {
        match err {
            StackupError::Namespace { .. } => err,
            other => StackupError::Namespace {
                namespace: self.namespace.to_string(),
                message: other.to_string(),
            },
        }
    }
}
