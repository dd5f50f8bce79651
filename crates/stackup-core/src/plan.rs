//! Execution plan: the ordered steps one invocation will take.
//!
//! The plan is computed once from the mode and the graph and then executed
//! strictly in order by the controller. Each step names exactly the services
//! it acts on, so no step consults shared state to decide what to do.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::graph::{Service, ServiceGraph};
use crate::hooks::{Hook, HookStage};
use crate::types::{Mode, Tier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    EnsureNamespace,
    Build {
        tier: Tier,
        services: Vec<String>,
    },
    LoadImages {
        tier: Tier,
        services: Vec<String>,
    },
    Hook {
        tier: Tier,
        stage: HookStage,
        hook: Hook,
    },
    Apply {
        tier: Tier,
        services: Vec<String>,
    },
    Wait {
        tier: Tier,
        services: Vec<String>,
        #[serde(rename = "timeout_secs", serialize_with = "crate::result::serialize_secs")]
        timeout: Duration,
    },
    ReportAccess {
        service: String,
    },
    DeleteNamespace,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::EnsureNamespace => write!(f, "ensure namespace"),
            Step::Build { tier, services } => {
                write!(f, "build {tier} images: {}", services.join(", "))
            }
            Step::LoadImages { tier, services } => {
                write!(f, "load {tier} images into cluster: {}", services.join(", "))
            }
            Step::Hook { tier, stage, hook } => write!(f, "{tier} {stage} hook: {hook}"),
            Step::Apply { tier, services } => {
                write!(f, "apply {tier} manifests: {}", services.join(", "))
            }
            Step::Wait { tier, timeout, .. } => {
                write!(f, "wait for {tier} tier (timeout {}s)", timeout.as_secs())
            }
            Step::ReportAccess { service } => write!(f, "report access URL of {service}"),
            Step::DeleteNamespace => write!(f, "delete namespace"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub mode: Mode,
    pub namespace: String,
    pub steps: Vec<Step>,
}

fn names<'a>(services: impl IntoIterator<Item = &'a Service>) -> Vec<String> {
    services.into_iter().map(|s| s.name.clone()).collect()
}

impl ExecutionPlan {
    pub fn new(
        mode: Mode,
        namespace: &str,
        graph: &ServiceGraph,
        timeouts: &TimeoutConfig,
        entrypoint: Option<&str>,
    ) -> Self {
        let mut steps = Vec::new();

        if mode == Mode::Cleanup {
            steps.push(Step::DeleteNamespace);
        } else {
            steps.push(Step::EnsureNamespace);

            // Every image is produced and loaded before the first manifest
            // is applied, so no tier can start on a missing image.
            for (tier, services) in graph.tiers() {
                let buildable = names(services.iter().filter(|s| s.buildable()));
                if buildable.is_empty() {
                    continue;
                }
                if mode.builds_images() {
                    steps.push(Step::Build {
                        tier,
                        services: buildable.clone(),
                    });
                }
                if mode.loads_images() {
                    steps.push(Step::LoadImages {
                        tier,
                        services: buildable,
                    });
                }
            }

            for (tier, services) in graph.tiers() {
                let hooks = graph.hooks(tier);
                let hook_steps = |stage: HookStage| -> Vec<Step> {
                    hooks
                        .stage(stage)
                        .iter()
                        .map(|hook| Step::Hook {
                            tier,
                            stage,
                            hook: hook.clone(),
                        })
                        .collect()
                };
                steps.extend(hook_steps(HookStage::BeforeApply));
                steps.push(Step::Apply {
                    tier,
                    services: names(services),
                });
                steps.push(Step::Wait {
                    tier,
                    services: names(services),
                    timeout: timeouts.for_tier(tier),
                });
                steps.extend(hook_steps(HookStage::AfterReady));
            }

            if let Some(entry) = entrypoint {
                steps.push(Step::ReportAccess {
                    service: entry.to_string(),
                });
            }
        }

        Self {
            mode,
            namespace: namespace.to_string(),
            steps,
        }
    }
}
