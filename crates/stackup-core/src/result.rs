use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::error::FailureCategory;
use crate::types::{Mode, ReadinessState, Tier};

/// Exit code reported for an interrupted run.
pub const CANCELLED_EXIT_CODE: i32 = 130;

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed {
        category: FailureCategory,
        message: String,
    },
    Cancelled,
}

/// Final per-service record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub tier: Tier,
    pub built: bool,
    pub loaded: bool,
    pub applied: bool,
    pub state: ReadinessState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one invocation. Produced once, at the end of the run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub namespace: String,
    pub mode: Mode,
    pub outcome: Outcome,
    pub services: Vec<ServiceReport>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    pub fn category(&self) -> Option<FailureCategory> {
        match &self.outcome {
            Outcome::Failed { category, .. } => Some(*category),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            Outcome::Succeeded => 0,
            Outcome::Cancelled => CANCELLED_EXIT_CODE,
            Outcome::Failed { category, .. } => category.exit_code(),
        }
    }

    /// Services that did not finish `Ready`, in graph order.
    pub fn unready(&self) -> impl Iterator<Item = &ServiceReport> {
        self.services.iter().filter(|s| !s.state.is_ready())
    }
}
