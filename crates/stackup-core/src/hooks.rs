//! Per-tier hooks: cluster actions that are not services but must happen at
//! a fixed point in a tier's rollout.
//!
//! `before_apply` hooks run ahead of the tier's manifests (config maps the
//! pods mount). `after_ready` hooks run once the tier's readiness barrier has
//! passed and before the next tier starts (seeding a database, restarting a
//! workload that cached stale configuration). Hooks run one at a time, in
//! declaration order, each under its own timeout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cluster::ClusterClient;
use crate::error::{Result, StackupError};
use crate::paths;
use crate::types::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    /// Submit a manifest that is not tracked for readiness.
    Apply(PathBuf),
    /// Run a command inside a pod of `workload`. The command should be
    /// idempotent: every deploy runs it again.
    Exec {
        workload: String,
        command: Vec<String>,
    },
    /// Roll `workload` and wait for the new rollout.
    Restart(String),
}

impl Hook {
    fn resolve(&self, root: &Path) -> Hook {
        match self {
            Hook::Apply(path) => Hook::Apply(paths::resolve(root, path)),
            other => other.clone(),
        }
    }

    /// Why this hook can never succeed, if it is malformed.
    pub fn problem(&self) -> Option<&'static str> {
        match self {
            Hook::Apply(path) if path.as_os_str().is_empty() => Some("apply path must not be empty"),
            Hook::Exec { workload, .. } | Hook::Restart(workload) if workload.trim().is_empty() => {
                Some("workload must not be empty")
            }
            Hook::Exec { command, .. } if command.is_empty() => Some("exec command must not be empty"),
            _ => None,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Apply(path) => write!(f, "apply {}", path.display()),
            Hook::Exec { workload, command } => {
                write!(f, "exec in {workload}: {}", command.join(" "))
            }
            Hook::Restart(workload) => write!(f, "restart {workload}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStage {
    BeforeApply,
    AfterReady,
}

impl HookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HookStage::BeforeApply => "before_apply",
            HookStage::AfterReady => "after_ready",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierHooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_apply: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_ready: Vec<Hook>,
}

impl TierHooks {
    pub fn stage(&self, stage: HookStage) -> &[Hook] {
        match stage {
            HookStage::BeforeApply => &self.before_apply,
            HookStage::AfterReady => &self.after_ready,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before_apply.is_empty() && self.after_ready.is_empty()
    }

    /// Copy with every manifest path resolved against `root`.
    pub fn resolve(&self, root: &Path) -> TierHooks {
        TierHooks {
            before_apply: self.before_apply.iter().map(|h| h.resolve(root)).collect(),
            after_ready: self.after_ready.iter().map(|h| h.resolve(root)).collect(),
        }
    }
}

/// Runs hooks against the cluster, one at a time.
pub struct HookRunner<'a, C> {
    client: &'a C,
    namespace: &'a str,
    timeout: Duration,
}

impl<'a, C: ClusterClient> HookRunner<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str, timeout: Duration) -> Self {
        Self {
            client,
            namespace,
            timeout,
        }
    }

    pub async fn run(&self, tier: Tier, stage: HookStage, hook: &Hook) -> Result<()> {
        tracing::info!(%tier, %stage, %hook, "running hook");
        let action = async {
            match hook {
                Hook::Apply(path) => self.client.apply_manifest(self.namespace, path).await,
                Hook::Exec { workload, command } => {
                    self.client.exec(self.namespace, workload, command).await
                }
                Hook::Restart(workload) => {
                    self.client
                        .restart(self.namespace, workload, self.timeout)
                        .await
                }
            }
        };
        match tokio::time::timeout(self.timeout, action).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StackupError::Hook {
                hook: hook.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(StackupError::Hook {
                hook: hook.to_string(),
                message: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }
}
