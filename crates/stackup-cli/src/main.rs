mod cmd;
mod output;
mod root;

use clap::Parser;
use cmd::deploy::DeployArgs;
use stackup_core::StackupError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackup",
    about = "Deploy a tiered multi-service stack onto a local single-node cluster",
    long_about = "Builds images, applies manifests tier by tier (infra before app) and waits \
                  for each tier to become ready. With no mode switch, runs a full deploy.",
    version
)]
struct Cli {
    /// Project root (default: auto-detect from stackup.yaml or .git/)
    #[arg(long, env = "STACKUP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Verbose logging (debug level)
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q')]
    quiet: bool,

    #[command(flatten)]
    deploy: DeployArgs,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    match cmd::deploy::run(&root, &cli.deploy, cli.json) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            let code = e
                .downcast_ref::<StackupError>()
                .map_or(1, |se| se.category().exit_code());
            std::process::exit(code);
        }
    }
}
