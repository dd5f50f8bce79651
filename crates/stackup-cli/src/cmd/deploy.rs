use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use stackup_core::config::Config;
use stackup_core::docker::DockerBuilder;
use stackup_core::kubectl::KubectlClient;
use stackup_core::plan::ExecutionPlan;
use stackup_core::tools::{ToolOverrides, ToolPaths};
use stackup_core::{cancel_channel, DeploymentResult, Mode, ModeController, Settings, StackupError};

use crate::output::{print_json, print_plan, print_result, print_warnings};

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Reuse existing images: skip the build phase
    #[arg(long)]
    pub skip_build: bool,

    /// Only apply manifests and wait for readiness (no builds)
    #[arg(long, visible_alias = "only-apply")]
    pub apply_only: bool,

    /// Delete the namespace and everything in it
    #[arg(long)]
    pub cleanup: bool,

    /// Target namespace (default: from stackup.yaml, else "ruoyi")
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Config file (default: <root>/stackup.yaml, else the built-in stack)
    #[arg(long, env = "STACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the execution plan and exit without touching the cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Readiness timeout for the infra tier, in seconds
    #[arg(long, value_name = "SECS")]
    pub infra_timeout: Option<u64>,

    /// Readiness timeout for the app tier, in seconds
    #[arg(long, value_name = "SECS")]
    pub app_timeout: Option<u64>,

    /// Seconds between status polls
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Path to the docker executable
    #[arg(long, env = "STACKUP_DOCKER_BIN", value_name = "PATH")]
    pub docker_bin: Option<PathBuf>,

    /// Path to the kubectl executable
    #[arg(long, env = "STACKUP_KUBECTL_BIN", value_name = "PATH")]
    pub kubectl_bin: Option<PathBuf>,

    /// Path to the minikube executable
    #[arg(long, env = "STACKUP_MINIKUBE_BIN", value_name = "PATH")]
    pub minikube_bin: Option<PathBuf>,
}

impl DeployArgs {
    fn mode(&self) -> Result<Mode, StackupError> {
        Mode::from_flags(self.skip_build, self.apply_only, self.cleanup)
    }

    fn overrides(&self) -> ToolOverrides {
        ToolOverrides {
            docker: self.docker_bin.clone(),
            kubectl: self.kubectl_bin.clone(),
            minikube: self.minikube_bin.clone(),
        }
    }

    /// Fold command-line overrides into the loaded config.
    fn apply_to(&self, config: &mut Config) {
        if let Some(ns) = &self.namespace {
            config.namespace = ns.clone();
        }
        if let Some(secs) = self.infra_timeout {
            config.timeouts.infra_secs = secs;
        }
        if let Some(secs) = self.app_timeout {
            config.timeouts.app_secs = secs;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => {
            let path = stackup_core::paths::resolve(root, path);
            Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => Config::load_or_default(root).context("failed to load config"),
    }
}

/// Validate, plan and (unless `--dry-run`) execute one invocation.
/// Returns the process exit code.
pub fn run(root: &Path, args: &DeployArgs, json: bool) -> anyhow::Result<i32> {
    let mode = args.mode()?;

    let mut config = load_config(root, args.config.as_deref())?;
    args.apply_to(&mut config);

    let warnings = config.validate();
    if !json {
        print_warnings(&warnings);
    }
    if Config::has_errors(&warnings) {
        let errors: Vec<&str> = warnings
            .iter()
            .filter(|w| w.level == stackup_core::config::WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        return Err(StackupError::InvalidConfig(errors.join("; ")).into());
    }

    let graph = config.graph(root)?;
    if mode.deploys() {
        let missing = graph.missing_manifests();
        for e in missing.iter().skip(1) {
            tracing::error!("{e}");
        }
        if let Some(first) = missing.into_iter().next() {
            return Err(first.into());
        }
    }

    let settings = Settings::from_config(&config);
    let plan = ExecutionPlan::new(
        mode,
        &settings.namespace,
        &graph,
        &settings.timeouts,
        settings.entrypoint.as_deref(),
    );

    if args.dry_run {
        if json {
            print_json(&plan)?;
        } else {
            print_plan(&plan);
        }
        return Ok(0);
    }

    let tools = ToolPaths::resolve(mode, &args.overrides())?;
    tracing::debug!(?tools, "resolved tools");
    let access_hint = settings.entrypoint.as_deref().map(|entry| {
        format!(
            "minikube service -n {} {entry} --url",
            settings.namespace
        )
    });

    let builder = DockerBuilder::new(
        tools.docker.clone().unwrap_or_else(|| PathBuf::from("docker")),
        tools.minikube.clone(),
    );
    let cluster = KubectlClient::new(tools.kubectl.clone(), tools.minikube.clone());
    let controller = ModeController::new(&graph, &builder, &cluster, settings);

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let result = rt.block_on(async {
        let (handle, signal) = cancel_channel();
        // Never completes: it only flips the signal and lets the run wind down.
        let interrupt = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("interrupt received, stopping");
                    handle.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
            }
            std::future::pending::<DeploymentResult>().await
        };
        tokio::select! {
            result = controller.execute(&plan, signal) => result,
            result = interrupt => result,
        }
    });

    if json {
        print_json(&result)?;
    } else {
        print_result(&result, access_hint.as_deref());
    }
    Ok(result.exit_code())
}
