use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackupError {
    #[error("conflicting mode flags: {0}")]
    ConflictingModes(String),

    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("service '{0}' is declared in both the infra and app tiers")]
    ServiceInMultipleTiers(String),

    #[error("service graph is empty: declare at least one service")]
    EmptyGraph,

    #[error("invalid service '{service}': {reason}")]
    InvalidService { service: String, reason: String },

    #[error("entrypoint '{0}' is not a declared service")]
    UnknownEntrypoint(String),

    #[error("manifest not found for '{service}': {path}")]
    ManifestNotFound { service: String, path: String },

    #[error("missing required tool '{tool}': {hint}")]
    ToolNotFound { tool: String, hint: String },

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed ({code}): {command}{}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("build failed for '{service}': {message}")]
    Build { service: String, message: String },

    #[error("apply failed for '{service}': {message}")]
    Apply { service: String, message: String },

    #[error("namespace '{namespace}': {message}")]
    Namespace { namespace: String, message: String },

    #[error("hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    #[error("unexpected status payload for '{resource}': {message}")]
    Status { resource: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

impl StackupError {
    /// Which part of the taxonomy this error belongs to.
    pub fn category(&self) -> FailureCategory {
        match self {
            StackupError::ConflictingModes(_)
            | StackupError::DuplicateService(_)
            | StackupError::ServiceInMultipleTiers(_)
            | StackupError::EmptyGraph
            | StackupError::InvalidService { .. }
            | StackupError::UnknownEntrypoint(_)
            | StackupError::ManifestNotFound { .. }
            | StackupError::ToolNotFound { .. }
            | StackupError::ConfigNotFound(_)
            | StackupError::InvalidConfig(_)
            | StackupError::Yaml(_) => FailureCategory::Validation,
            StackupError::Build { .. } => FailureCategory::Build,
            StackupError::Apply { .. } => FailureCategory::Apply,
            StackupError::Namespace { .. } => FailureCategory::Namespace,
            StackupError::Hook { .. } => FailureCategory::Hook,
            StackupError::Spawn { .. }
            | StackupError::CommandFailed { .. }
            | StackupError::Status { .. }
            | StackupError::Io(_)
            | StackupError::Json(_) => FailureCategory::Internal,
        }
    }
}

/// Coarse failure classes surfaced in a [`crate::DeploymentResult`] and
/// mapped onto process exit codes by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Validation,
    Build,
    Apply,
    Namespace,
    Readiness,
    Hook,
    Internal,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Validation => "validation",
            FailureCategory::Build => "build",
            FailureCategory::Apply => "apply",
            FailureCategory::Namespace => "namespace",
            FailureCategory::Readiness => "readiness",
            FailureCategory::Hook => "hook",
            FailureCategory::Internal => "internal",
        }
    }

    /// Process exit code for a run that failed with this category.
    ///
    /// Namespace failures share the apply code: both are rejected
    /// submissions to the cluster control plane.
    pub fn exit_code(self) -> i32 {
        match self {
            FailureCategory::Validation => 2,
            FailureCategory::Build => 3,
            FailureCategory::Apply | FailureCategory::Namespace => 4,
            FailureCategory::Readiness => 5,
            FailureCategory::Hook => 6,
            FailureCategory::Internal => 1,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, StackupError>;
