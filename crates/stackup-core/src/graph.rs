//! Static service graph: two tiers of services, `infra` before `app`.
//!
//! The graph is validated once when it is built and never mutated after.
//! There are no finer-grained edges than the tier boundary, so it is acyclic
//! by construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, StackupError};
use crate::hooks::{Hook, TierHooks};
use crate::types::Tier;

/// Kubernetes workload kind the readiness check inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Deployment,
    Statefulset,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Statefulset => "statefulset",
        }
    }
}

/// Which resource to poll, and how to find its pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    pub kind: ResourceKind,
    pub name: String,
    pub selector: String,
}

impl ReadinessCheck {
    pub fn for_service(name: &str) -> Self {
        Self {
            kind: ResourceKind::Deployment,
            name: name.to_string(),
            selector: format!("app={name}"),
        }
    }
}

/// How to produce the container image a service's manifest references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub image: String,
    pub context: PathBuf,
    pub dockerfile: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub tier: Tier,
    pub manifest: PathBuf,
    pub build: Option<BuildSpec>,
    pub readiness: ReadinessCheck,
}

impl Service {
    pub fn new(name: impl Into<String>, tier: Tier, manifest: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let readiness = ReadinessCheck::for_service(&name);
        Self {
            name,
            tier,
            manifest: manifest.into(),
            build: None,
            readiness,
        }
    }

    pub fn with_build(mut self, build: BuildSpec) -> Self {
        self.build = Some(build);
        self
    }

    pub fn buildable(&self) -> bool {
        self.build.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceGraph {
    infra: Vec<Service>,
    app: Vec<Service>,
    infra_hooks: TierHooks,
    app_hooks: TierHooks,
}

impl ServiceGraph {
    /// Partition `services` by tier, rejecting duplicates and cross-tier
    /// redeclarations.
    pub fn new(services: Vec<Service>) -> Result<Self> {
        if services.is_empty() {
            return Err(StackupError::EmptyGraph);
        }

        let mut seen: Vec<(&str, Tier)> = Vec::new();
        for svc in &services {
            if svc.name.trim().is_empty() {
                return Err(StackupError::InvalidService {
                    service: svc.name.clone(),
                    reason: "name must not be empty".into(),
                });
            }
            if let Some((_, tier)) = seen.iter().find(|(n, _)| *n == svc.name) {
                return Err(if *tier == svc.tier {
                    StackupError::DuplicateService(svc.name.clone())
                } else {
                    StackupError::ServiceInMultipleTiers(svc.name.clone())
                });
            }
            seen.push((svc.name.as_str(), svc.tier));
        }

        let (infra, app): (Vec<Service>, Vec<Service>) =
            services.into_iter().partition(|s| s.tier == Tier::Infra);
        Ok(Self {
            infra,
            app,
            infra_hooks: TierHooks::default(),
            app_hooks: TierHooks::default(),
        })
    }

    pub fn with_hooks(mut self, tier: Tier, hooks: TierHooks) -> Self {
        match tier {
            Tier::Infra => self.infra_hooks = hooks,
            Tier::App => self.app_hooks = hooks,
        }
        self
    }

    pub fn hooks(&self, tier: Tier) -> &TierHooks {
        match tier {
            Tier::Infra => &self.infra_hooks,
            Tier::App => &self.app_hooks,
        }
    }

    /// Non-empty tiers in dependency order.
    pub fn tiers(&self) -> Vec<(Tier, &[Service])> {
        Tier::all()
            .iter()
            .map(|&t| (t, self.tier(t)))
            .filter(|(_, services)| !services.is_empty())
            .collect()
    }

    pub fn tier(&self, tier: Tier) -> &[Service] {
        match tier {
            Tier::Infra => &self.infra,
            Tier::App => &self.app,
        }
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.infra.iter().chain(self.app.iter())
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services().find(|s| s.name == name)
    }

    /// Manifests that do not exist on disk, as validation errors. Covers
    /// service manifests and the ones `apply` hooks submit.
    pub fn missing_manifests(&self) -> Vec<StackupError> {
        let services = self
            .services()
            .map(|s| (s.name.clone(), &s.manifest));
        let hooks = Tier::all().iter().flat_map(|&tier| {
            let hooks = self.hooks(tier);
            hooks
                .before_apply
                .iter()
                .chain(&hooks.after_ready)
                .filter_map(move |h| match h {
                    Hook::Apply(path) => Some((format!("{tier} hook"), path)),
                    _ => None,
                })
        });
        services
            .chain(hooks)
            .filter(|(_, path)| !path.is_file())
            .map(|(owner, path)| StackupError::ManifestNotFound {
                service: owner,
                path: path.display().to_string(),
            })
            .collect()
    }
}
