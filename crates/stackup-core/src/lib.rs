pub mod applier;
pub mod builder;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod docker;
pub mod error;
pub mod exec;
pub mod graph;
pub mod hooks;
pub mod kubectl;
pub mod namespace;
pub mod paths;
pub mod plan;
pub mod result;
pub mod tools;
pub mod types;
pub mod waiter;

#[cfg(test)]
mod testkit;

pub use controller::{cancel_channel, CancelHandle, CancelSignal, ModeController, Settings};
pub use error::{FailureCategory, Result, StackupError};
pub use graph::{Service, ServiceGraph};
pub use hooks::{Hook, HookStage};
pub use result::{DeploymentResult, Outcome};
pub use types::{Mode, ReadinessState, Tier};
