use std::path::PathBuf;

use crate::builder::Builder;
use crate::error::{Result, StackupError};
use crate::exec::Cmd;
use crate::graph::Service;

/// Builds images with the docker CLI and loads them into minikube's image
/// store with `minikube image load`, so manifests can reference them
/// without a registry.
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    docker: PathBuf,
    minikube: Option<PathBuf>,
}

impl DockerBuilder {
    pub fn new(docker: PathBuf, minikube: Option<PathBuf>) -> Self {
        Self { docker, minikube }
    }

    fn build_cmd(&self, service: &Service) -> Option<Cmd> {
        let spec = service.build.as_ref()?;
        Some(
            Cmd::new(&self.docker)
                .args(["build", "-t", spec.image.as_str(), "-f"])
                .arg(&spec.dockerfile)
                .arg(&spec.context),
        )
    }

    fn load_cmd(&self, image: &str) -> Option<Cmd> {
        let minikube = self.minikube.as_ref()?;
        Some(Cmd::new(minikube).args(["image", "load", image]))
    }
}

impl Builder for DockerBuilder {
    async fn build(&self, service: &Service) -> Result<()> {
        let (Some(spec), Some(cmd)) = (service.build.as_ref(), self.build_cmd(service)) else {
            return Ok(());
        };

        let out = cmd.output(None).await?;
        if !out.success() {
            // docker writes build progress to stderr; keep the tail only.
            let tail: Vec<&str> = out.stderr.lines().rev().take(20).collect();
            let stderr = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(StackupError::Build {
                service: service.name.clone(),
                message: format!(
                    "{} exited with {}\n{stderr}",
                    cmd.display(),
                    out.code.map_or_else(|| "signal".to_string(), |c| c.to_string())
                ),
            });
        }
        tracing::debug!(service = %service.name, image = %spec.image, "image built");
        Ok(())
    }

    async fn load(&self, service: &Service) -> Result<()> {
        let Some(spec) = service.build.as_ref() else {
            return Ok(());
        };
        let Some(load) = self.load_cmd(&spec.image) else {
            tracing::debug!(service = %service.name, "no minikube configured, image not loaded");
            return Ok(());
        };
        load.status().await?;
        tracing::debug!(service = %service.name, image = %spec.image, "image loaded into cluster");
        Ok(())
    }
}
