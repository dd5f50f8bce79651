//! Locate the external executables a run needs.
//!
//! `kubectl` is always required. `minikube` is needed by every deploying
//! mode (image loading, access URL). `docker` is needed only when images
//! are going to be built.

use std::path::{Path, PathBuf};

use crate::error::{Result, StackupError};
use crate::types::Mode;

/// Explicit executable paths that take precedence over `PATH` lookup.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub docker: Option<PathBuf>,
    pub kubectl: Option<PathBuf>,
    pub minikube: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub kubectl: PathBuf,
    pub minikube: Option<PathBuf>,
    pub docker: Option<PathBuf>,
}

impl ToolPaths {
    pub fn resolve(mode: Mode, overrides: &ToolOverrides) -> Result<Self> {
        let kubectl = locate("kubectl", overrides.kubectl.as_deref())?;
        let minikube = if mode.deploys() {
            Some(locate("minikube", overrides.minikube.as_deref())?)
        } else {
            None
        };
        let docker = if mode.builds_images() {
            Some(locate("docker", overrides.docker.as_deref())?)
        } else {
            None
        };
        Ok(Self {
            kubectl,
            minikube,
            docker,
        })
    }
}

fn locate(tool: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(StackupError::ToolNotFound {
            tool: tool.to_string(),
            hint: format!("override path does not exist: {}", path.display()),
        });
    }
    which::which(tool).map_err(|_| StackupError::ToolNotFound {
        tool: tool.to_string(),
        hint: format!("install it or add it to PATH (or pass --{tool}-bin)"),
    })
}
