use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StackupError};

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Dependency group. Every `Infra` service must be ready before any `App`
/// service is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Infra,
    App,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[Tier::Infra, Tier::App]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Infra => "infra",
            Tier::App => "app",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    FullDeploy,
    SkipBuild,
    ApplyOnly,
    Cleanup,
}

impl Mode {
    /// Resolve the mode from the three mutually exclusive CLI switches.
    /// No switch means a full deploy.
    pub fn from_flags(skip_build: bool, apply_only: bool, cleanup: bool) -> Result<Mode> {
        let mut chosen = Vec::new();
        if skip_build {
            chosen.push("--skip-build");
        }
        if apply_only {
            chosen.push("--apply-only");
        }
        if cleanup {
            chosen.push("--cleanup");
        }
        match chosen.len() {
            0 => Ok(Mode::FullDeploy),
            1 if skip_build => Ok(Mode::SkipBuild),
            1 if apply_only => Ok(Mode::ApplyOnly),
            1 => Ok(Mode::Cleanup),
            _ => Err(StackupError::ConflictingModes(format!(
                "{} cannot be combined",
                chosen.join(" and ")
            ))),
        }
    }

    pub fn builds_images(self) -> bool {
        matches!(self, Mode::FullDeploy)
    }

    /// Modes that push locally available images into the cluster runtime.
    /// Only `ApplyOnly` trusts the cluster to already hold them.
    pub fn loads_images(self) -> bool {
        matches!(self, Mode::FullDeploy | Mode::SkipBuild)
    }

    pub fn deploys(self) -> bool {
        !matches!(self, Mode::Cleanup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::FullDeploy => "full_deploy",
            Mode::SkipBuild => "skip_build",
            Mode::ApplyOnly => "apply_only",
            Mode::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClusterStatus
// ---------------------------------------------------------------------------

/// What the control plane reports for one submitted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterStatus {
    NotFound,
    Progressing,
    Ready,
    Failed { cause: FailureCause, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The rollout itself reported an error (deadline exceeded, replica failure).
    Rollout,
    /// The container image could not be pulled by the cluster runtime.
    ImageUnavailable,
}

// ---------------------------------------------------------------------------
// ReadinessState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadinessState {
    Pending,
    Progressing,
    Ready,
    Failed { failure: FailureKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Error(String),
    ImageUnavailable(String),
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadinessState::Ready | ReadinessState::Failed { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn failed(failure: FailureKind) -> Self {
        ReadinessState::Failed { failure }
    }

    /// Advance the per-service state machine by one observation.
    ///
    /// Terminal states absorb every later observation. A first observation
    /// of `Ready` passes through `Progressing` implicitly.
    pub fn observe(&self, status: &ClusterStatus) -> ReadinessState {
        if self.is_terminal() {
            return self.clone();
        }
        match status {
            ClusterStatus::NotFound => self.clone(),
            ClusterStatus::Progressing => ReadinessState::Progressing,
            ClusterStatus::Ready => ReadinessState::Ready,
            ClusterStatus::Failed { cause, message } => ReadinessState::failed(match cause {
                FailureCause::Rollout => FailureKind::Error(message.clone()),
                FailureCause::ImageUnavailable => FailureKind::ImageUnavailable(message.clone()),
            }),
        }
    }

    /// The state a still-open wait resolves to once its deadline passes.
    pub fn expire(&self) -> ReadinessState {
        if self.is_terminal() {
            self.clone()
        } else {
            ReadinessState::failed(FailureKind::Timeout)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReadinessState::Pending => "pending",
            ReadinessState::Progressing => "progressing",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed {
                failure: FailureKind::Timeout,
            } => "failed (timeout)",
            ReadinessState::Failed {
                failure: FailureKind::ImageUnavailable(_),
            } => "failed (image)",
            ReadinessState::Failed { .. } => "failed (error)",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
