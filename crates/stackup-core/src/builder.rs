use std::future::Future;
use std::time::Duration;

use futures::stream::{self, TryStreamExt};

use crate::error::{Result, StackupError};
use crate::graph::Service;

/// Capability to produce the artifact a buildable service's manifest
/// references, and to make it visible to the cluster runtime.
pub trait Builder {
    fn build(&self, service: &Service) -> impl Future<Output = Result<()>>;

    /// Push an already built artifact into the cluster's image store.
    fn load(&self, service: &Service) -> impl Future<Output = Result<()>>;
}

/// Drives a [`Builder`] over the buildable services of a tier with bounded
/// parallelism. The first failure aborts the tier: in-flight builds are
/// dropped (and their processes killed) and no further builds start.
/// Each build and each load is cut off after `timeout`.
pub struct ImageBuilder<'a, B> {
    builder: &'a B,
    parallelism: usize,
    timeout: Duration,
}

impl<'a, B: Builder> ImageBuilder<'a, B> {
    pub fn new(builder: &'a B, parallelism: usize, timeout: Duration) -> Self {
        Self {
            builder,
            parallelism: parallelism.max(1),
            timeout,
        }
    }

    /// Build one service, wrapping any failure as a build error.
    pub async fn build(&self, service: &Service) -> Result<()> {
        if !service.buildable() {
            return Ok(());
        }
        tracing::info!(service = %service.name, "building image");
        self.bounded(service, "build", self.builder.build(service))
            .await?;
        tracing::info!(service = %service.name, "image ready");
        Ok(())
    }

    /// Load one service's image into the cluster.
    pub async fn load(&self, service: &Service) -> Result<()> {
        if !service.buildable() {
            return Ok(());
        }
        tracing::info!(service = %service.name, "loading image into cluster");
        self.bounded(service, "image load", self.builder.load(service))
            .await
    }

    async fn bounded(
        &self,
        service: &Service,
        action: &str,
        work: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ StackupError::Build { .. })) => Err(e),
            Ok(Err(other)) => Err(StackupError::Build {
                service: service.name.clone(),
                message: format!("{action}: {other}"),
            }),
            Err(_) => Err(StackupError::Build {
                service: service.name.clone(),
                message: format!("{action} timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    /// Build every buildable service in `services`. Returns the names built.
    pub async fn build_all(&self, services: &[Service]) -> Result<Vec<String>> {
        let targets: Vec<&Service> = services.iter().filter(|s| s.buildable()).collect();
        stream::iter(targets.iter().copied().map(Ok::<_, StackupError>))
            .try_for_each_concurrent(self.parallelism, |svc| self.build(svc))
            .await?;
        Ok(targets.iter().map(|s| s.name.clone()).collect())
    }

    /// Load every buildable service's image. Returns the names loaded.
    pub async fn load_all(&self, services: &[Service]) -> Result<Vec<String>> {
        let targets: Vec<&Service> = services.iter().filter(|s| s.buildable()).collect();
        stream::iter(targets.iter().copied().map(Ok::<_, StackupError>))
            .try_for_each_concurrent(self.parallelism, |svc| self.load(svc))
            .await?;
        Ok(targets.iter().map(|s| s.name.clone()).collect())
    }
}
