use crate::error::{Result, StackupError};
use crate::graph::{BuildSpec, ReadinessCheck, ResourceKind, Service, ServiceGraph};
use crate::hooks::{Hook, TierHooks};
use crate::paths;
use crate::types::Tier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TimeoutConfig
// ---------------------------------------------------------------------------

/// Upper bound on any configured timeout: one week.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on the status poll interval.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60 * 60;

/// Every step that waits on an external tool has a bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Readiness barrier of the infra tier.
    #[serde(default = "default_infra_timeout")]
    pub infra_secs: u64,
    /// Readiness barrier of the app tier.
    #[serde(default = "default_app_timeout")]
    pub app_secs: u64,
    /// One image build, or one image load into the cluster.
    #[serde(default = "default_build_timeout")]
    pub build_secs: u64,
    /// One manifest submission.
    #[serde(default = "default_apply_timeout")]
    pub apply_secs: u64,
    /// Creating or deleting the namespace.
    #[serde(default = "default_namespace_timeout")]
    pub namespace_secs: u64,
    /// One hook.
    #[serde(default = "default_hook_timeout")]
    pub hook_secs: u64,
}

fn default_infra_timeout() -> u64 {
    600
}

fn default_app_timeout() -> u64 {
    900
}

fn default_build_timeout() -> u64 {
    1800
}

fn default_apply_timeout() -> u64 {
    120
}

fn default_namespace_timeout() -> u64 {
    300
}

fn default_hook_timeout() -> u64 {
    900
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            infra_secs: default_infra_timeout(),
            app_secs: default_app_timeout(),
            build_secs: default_build_timeout(),
            apply_secs: default_apply_timeout(),
            namespace_secs: default_namespace_timeout(),
            hook_secs: default_hook_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_tier(&self, tier: Tier) -> Duration {
        Duration::from_secs(match tier {
            Tier::Infra => self.infra_secs,
            Tier::App => self.app_secs,
        })
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn apply(&self) -> Duration {
        Duration::from_secs(self.apply_secs)
    }

    pub fn namespace(&self) -> Duration {
        Duration::from_secs(self.namespace_secs)
    }

    pub fn hook(&self) -> Duration {
        Duration::from_secs(self.hook_secs)
    }

    fn entries(&self) -> [(&'static str, u64); 6] {
        [
            ("timeouts.infra_secs", self.infra_secs),
            ("timeouts.app_secs", self.app_secs),
            ("timeouts.build_secs", self.build_secs),
            ("timeouts.apply_secs", self.apply_secs),
            ("timeouts.namespace_secs", self.namespace_secs),
            ("timeouts.hook_secs", self.hook_secs),
        ]
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default)]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub manifest: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessConfig>,
}

impl ServiceConfig {
    fn to_service(&self, root: &Path, tier: Tier) -> Result<Service> {
        let mut service = Service::new(&self.name, tier, paths::resolve(root, &self.manifest));

        if let Some(build) = &self.build {
            if build.image.trim().is_empty() {
                return Err(StackupError::InvalidService {
                    service: self.name.clone(),
                    reason: "build.image must not be empty".into(),
                });
            }
            service = service.with_build(BuildSpec {
                image: build.image.clone(),
                context: paths::resolve(root, &build.context),
                dockerfile: paths::resolve(root, &build.dockerfile),
            });
        }

        if let Some(r) = &self.readiness {
            let defaults = ReadinessCheck::for_service(&self.name);
            service.readiness = ReadinessCheck {
                kind: r.kind,
                name: r.name.clone().unwrap_or(defaults.name),
                selector: r.selector.clone().unwrap_or(defaults.selector),
            };
        }

        Ok(service)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TiersConfig {
    #[serde(default)]
    pub infra: Vec<ServiceConfig>,
    #[serde(default)]
    pub app: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub infra: TierHooks,
    #[serde(default)]
    pub app: TierHooks,
}

impl HooksConfig {
    fn tier(&self, tier: Tier) -> &TierHooks {
        match tier {
            Tier::Infra => &self.infra,
            Tier::App => &self.app,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Service whose externally reachable address is reported after a deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_build_parallelism")]
    pub build_parallelism: usize,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    pub tiers: TiersConfig,
    /// Hooks are written as single-key maps (`- restart: name`).
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub hooks: HooksConfig,
}

fn default_namespace() -> String {
    "ruoyi".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_build_parallelism() -> usize {
    6
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            entrypoint: Some("ruoyi-nginx".to_string()),
            poll_interval_secs: default_poll_interval(),
            build_parallelism: default_build_parallelism(),
            timeouts: TimeoutConfig::default(),
            tiers: default_tiers(),
            hooks: default_hooks(),
        }
    }
}

fn manifest(file: &str) -> PathBuf {
    Path::new(paths::MANIFEST_DIR).join(file)
}

fn infra(name: &str, file: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        manifest: manifest(file),
        build: None,
        readiness: None,
    }
}

fn app(name: &str, file: &str, image: &str, context: &str) -> ServiceConfig {
    let context = Path::new(paths::DOCKER_DIR).join(context);
    ServiceConfig {
        name: name.to_string(),
        manifest: manifest(file),
        build: Some(BuildSpec {
            image: image.to_string(),
            dockerfile: context.join("dockerfile"),
            context,
        }),
        readiness: None,
    }
}

fn default_tiers() -> TiersConfig {
    TiersConfig {
        infra: vec![
            infra("ruoyi-mysql", "mysql.yaml"),
            infra("ruoyi-redis", "redis.yaml"),
            infra("ruoyi-nacos", "nacos.yaml"),
        ],
        app: vec![
            app("ruoyi-gateway", "gateway.yaml", "ruoyi-gateway:jre17-1", "ruoyi/gateway"),
            app("ruoyi-auth", "auth.yaml", "ruoyi-auth:jre17-1", "ruoyi/auth"),
            app(
                "ruoyi-system",
                "system.yaml",
                "ruoyi-modules-system:jre17-1",
                "ruoyi/modules/system",
            ),
            app("ruoyi-gen", "gen.yaml", "ruoyi-modules-gen:jre17-1", "ruoyi/modules/gen"),
            app("ruoyi-job", "job.yaml", "ruoyi-modules-job:jre17-1", "ruoyi/modules/job"),
            app("ruoyi-file", "file.yaml", "ruoyi-modules-file:jre17-1", "ruoyi/modules/file"),
            app(
                "ruoyi-monitor",
                "monitor.yaml",
                "ruoyi-visual-monitor:jre17-1",
                "ruoyi/visual/monitor",
            ),
            app("ruoyi-nginx", "nginx.yaml", "ruoyi-ui:latest", "nginx"),
        ],
    }
}

/// Nacos caches its datasource settings at boot, before the database has
/// been seeded; bounce it once the infra tier is up.
fn default_hooks() -> HooksConfig {
    HooksConfig {
        infra: TierHooks {
            before_apply: Vec::new(),
            after_ready: vec![Hook::Restart("deployment/ruoyi-nacos".to_string())],
        },
        app: TierHooks::default(),
    }
}

impl Config {
    /// Load an explicit config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StackupError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `stackup.yaml` from the project root, or fall back to the
    /// built-in stack when the file is absent.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(root = %root.display(), "no stackup.yaml, using built-in stack");
            Ok(Self::default())
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Build the validated service graph, resolving every path against `root`.
    pub fn graph(&self, root: &Path) -> Result<ServiceGraph> {
        let mut services = Vec::new();
        for svc in &self.tiers.infra {
            services.push(svc.to_service(root, Tier::Infra)?);
        }
        for svc in &self.tiers.app {
            services.push(svc.to_service(root, Tier::App)?);
        }
        let graph = ServiceGraph::new(services)?
            .with_hooks(Tier::Infra, self.hooks.infra.resolve(root))
            .with_hooks(Tier::App, self.hooks.app.resolve(root));

        if let Some(entry) = &self.entrypoint {
            if graph.get(entry).is_none() {
                return Err(StackupError::UnknownEntrypoint(entry.clone()));
            }
        }
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.namespace.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "namespace must not be empty".to_string(),
            });
        }

        if self.poll_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "poll_interval_secs must be at least 1".to_string(),
            });
        } else if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "poll_interval_secs must be at most {MAX_POLL_INTERVAL_SECS} (got {})",
                    self.poll_interval_secs
                ),
            });
        }

        for (key, secs) in self.timeouts.entries() {
            let problem = if secs == 0 {
                Some(format!("{key} must be at least 1"))
            } else if secs > MAX_TIMEOUT_SECS {
                Some(format!("{key} must be at most {MAX_TIMEOUT_SECS} (got {secs})"))
            } else {
                None
            };
            if let Some(message) = problem {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message,
                });
            }
        }

        if self.build_parallelism == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "build_parallelism must be at least 1".to_string(),
            });
        }

        for (tier, secs) in [
            (Tier::Infra, self.timeouts.infra_secs),
            (Tier::App, self.timeouts.app_secs),
        ] {
            if secs < self.poll_interval_secs {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "{tier} timeout ({secs}s) is shorter than poll_interval_secs ({}s)",
                        self.poll_interval_secs
                    ),
                });
            }
        }

        if self.entrypoint.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no entrypoint configured; access URL will not be reported".to_string(),
            });
        }

        for svc in self.tiers.infra.iter().chain(self.tiers.app.iter()) {
            if svc.readiness.as_ref().and_then(|r| r.selector.as_ref()).is_some_and(|s| s.trim().is_empty()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "'{}' has an empty readiness selector; image pull failures will not be detected",
                        svc.name
                    ),
                });
            }
        }

        for tier in Tier::all() {
            let hooks = self.hooks.tier(*tier);
            let stages = [
                ("before_apply", &hooks.before_apply),
                ("after_ready", &hooks.after_ready),
            ];
            for (stage, list) in stages {
                for (i, hook) in list.iter().enumerate() {
                    if let Some(problem) = hook.problem() {
                        warnings.push(ConfigWarning {
                            level: WarnLevel::Error,
                            message: format!("hooks.{tier}.{stage}[{i}]: {problem}"),
                        });
                    }
                }
            }
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}
