#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn stackup(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stackup").unwrap();
    cmd.current_dir(dir.path())
        .env("STACKUP_ROOT", dir.path())
        .env_remove("STACKUP_CONFIG")
        .env_remove("STACKUP_DOCKER_BIN")
        .env_remove("STACKUP_KUBECTL_BIN")
        .env_remove("STACKUP_MINIKUBE_BIN")
        .env_remove("RUST_LOG");
    cmd
}

const CONFIG: &str = "\
namespace: demo
entrypoint: web
tiers:
  infra:
    - name: db
      manifest: k8s/db.yaml
      readiness:
        kind: statefulset
  app:
    - name: web
      manifest: k8s/web.yaml
      build:
        image: web:dev
        context: web
        dockerfile: web/Dockerfile
    - name: worker
      manifest: k8s/worker.yaml
";

const HOOKS: &str = "\
hooks:
  infra:
    after_ready:
      - restart: deployment/db-admin
";

fn init_project(dir: &TempDir) {
    std::fs::write(dir.path().join("stackup.yaml"), CONFIG).unwrap();
    let k8s = dir.path().join("k8s");
    std::fs::create_dir_all(&k8s).unwrap();
    for name in ["db", "web", "worker"] {
        std::fs::write(k8s.join(format!("{name}.yaml")), "apiVersion: v1\n").unwrap();
    }
}

// ---------------------------------------------------------------------------
// argument handling
// ---------------------------------------------------------------------------

#[test]
fn help_lists_mode_switches() {
    let dir = TempDir::new().unwrap();
    stackup(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--skip-build"))
        .stdout(predicate::str::contains("--apply-only"))
        .stdout(predicate::str::contains("--cleanup"));
}

#[test]
fn conflicting_modes_exit_with_validation_code() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--skip-build", "--cleanup", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be combined"));
}

#[test]
fn all_three_modes_together_are_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--skip-build", "--apply-only", "--cleanup"])
        .assert()
        .code(2);
}

// ---------------------------------------------------------------------------
// dry run
// ---------------------------------------------------------------------------

#[test]
fn full_deploy_plan_builds_then_applies_tiers_in_order() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let out = stackup(&dir)
        .arg("--dry-run")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();

    let build = text.find("build app images: web").unwrap();
    let load = text.find("load app images into cluster: web").unwrap();
    let infra = text.find("apply infra manifests: db").unwrap();
    let wait_infra = text.find("wait for infra tier (timeout 600s)").unwrap();
    let app = text.find("apply app manifests: web, worker").unwrap();
    assert!(build < load && load < infra && infra < wait_infra && wait_infra < app);
    assert!(text.contains("report access URL of web"));
}

#[test]
fn apply_only_plan_has_no_build_step() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--apply-only", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apply infra manifests"))
        .stdout(predicate::str::contains("images").not());
}

#[test]
fn only_apply_alias_is_accepted() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--only-apply", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mode apply_only"));
}

#[test]
fn cleanup_plan_only_deletes_namespace() {
    let dir = TempDir::new().unwrap();
    // Cleanup does not need manifests on disk.
    stackup(&dir)
        .args(["--cleanup", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace 'ruoyi'"))
        .stdout(predicate::str::contains("1. delete namespace"))
        .stdout(predicate::str::contains("apply").not());
}

#[test]
fn json_plan_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let out = stackup(&dir)
        .args(["--skip-build", "--dry-run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let plan: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(plan["mode"], "skip_build");
    assert_eq!(plan["namespace"], "demo");
    assert_eq!(plan["steps"][0]["step"], "ensure_namespace");
    assert_eq!(plan["steps"][1]["step"], "load_images");
    assert_eq!(plan["steps"][1]["services"][0], "web");
    assert_eq!(plan["steps"][2]["step"], "apply");
    assert_eq!(plan["steps"][2]["tier"], "infra");
    assert_eq!(plan["steps"][3]["timeout_secs"], 600.0);
}

#[test]
fn hooks_appear_between_infra_wait_and_app_apply() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(dir.path().join("stackup.yaml"), format!("{CONFIG}{HOOKS}")).unwrap();
    let out = stackup(&dir)
        .args(["--apply-only", "--dry-run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();

    let wait_infra = text.find("wait for infra tier").unwrap();
    let hook = text.find("infra after_ready hook: restart deployment/db-admin").unwrap();
    let app = text.find("apply app manifests").unwrap();
    assert!(wait_infra < hook && hook < app);
}

#[test]
fn flags_override_namespace_and_timeouts() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args([
            "--apply-only",
            "--dry-run",
            "-n",
            "staging",
            "--infra-timeout",
            "42",
            "--app-timeout",
            "99",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace 'staging'"))
        .stdout(predicate::str::contains("wait for infra tier (timeout 42s)"))
        .stdout(predicate::str::contains("wait for app tier (timeout 99s)"));
}

// ---------------------------------------------------------------------------
// validation
// ---------------------------------------------------------------------------

#[test]
fn missing_manifest_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::remove_file(dir.path().join("k8s/worker.yaml")).unwrap();
    stackup(&dir)
        .args(["--apply-only", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("manifest not found for 'worker'"));
}

#[test]
fn built_in_stack_without_manifests_fails_validation() {
    let dir = TempDir::new().unwrap();
    stackup(&dir)
        .arg("--dry-run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("manifest not found"));
}

#[test]
fn invalid_config_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--dry-run", "--poll-interval", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("poll_interval_secs must be at least 1"));
}

#[test]
fn oversized_timeout_fails_validation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--dry-run", "--infra-timeout", &u64::MAX.to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timeouts.infra_secs must be at most"));
}

#[test]
fn duplicate_service_fails_validation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let dup = CONFIG.replace("name: worker", "name: web");
    std::fs::write(dir.path().join("stackup.yaml"), dup).unwrap();
    stackup(&dir)
        .arg("--dry-run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("declared more than once"));
}

#[test]
fn malformed_yaml_fails_validation() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("stackup.yaml"), "tiers: [unclosed\n").unwrap();
    stackup(&dir).arg("--dry-run").assert().code(2);
}

#[test]
fn explicit_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    stackup(&dir)
        .args(["--dry-run", "--config", "nope.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn missing_tool_fails_before_touching_the_cluster() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    stackup(&dir)
        .args(["--apply-only", "--kubectl-bin", "/nonexistent/kubectl"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing required tool 'kubectl'"));
}

// ---------------------------------------------------------------------------
// runs against stub tools
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod stub_tools {
    use super::*;
    use std::path::{Path, PathBuf};

    const READY: &str = r#"{"metadata":{"generation":1},"spec":{"replicas":1},"status":{"observedGeneration":1,"replicas":1,"updatedReplicas":1,"readyReplicas":1,"availableReplicas":1}}"#;

    /// Write an executable shell script under `<dir>/bin` that appends its
    /// arguments to `<name>.log` before running `body`.
    fn stub(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        let script = format!(
            "#!/bin/sh\necho \"$*\" >> \"$(dirname \"$0\")/{name}.log\"\n{body}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn log(dir: &TempDir, name: &str) -> String {
        std::fs::read_to_string(dir.path().join("bin").join(format!("{name}.log")))
            .unwrap_or_default()
    }

    /// A kubectl that answers like a healthy cluster. `overrides` are case
    /// arms matched before the defaults.
    fn kubectl(dir: &TempDir, overrides: &str) -> PathBuf {
        let body = format!(
            r#"case "$*" in
{overrides}
  *"create namespace"*) printf 'apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n' ;;
  *"apply -f -"*) cat > /dev/null; echo "namespace/demo configured" ;;
  *"apply -n"*) echo "deployment.apps/stub configured" ;;
  *"get pods"*) echo '{{"items":[]}}' ;;
  *" get "*) echo '{READY}' ;;
  *"delete namespace"*) echo 'namespace "demo" deleted' ;;
  *"rollout"*) echo "rolled" ;;
  *) echo "unexpected kubectl call: $*" >&2; exit 1 ;;
esac"#
        );
        stub(dir, "kubectl", &body)
    }

    fn minikube(dir: &TempDir) -> PathBuf {
        stub(
            dir,
            "minikube",
            r#"case "$1" in
  image) exit 0 ;;
  service) echo "http://127.0.0.1:30080" ;;
  *) exit 1 ;;
esac"#,
        )
    }

    fn docker(dir: &TempDir, body: &str) -> PathBuf {
        stub(dir, "docker", body)
    }

    fn tools(cmd: &mut Command, kubectl: &Path, minikube: &Path, docker: Option<&Path>) {
        cmd.arg("--kubectl-bin")
            .arg(kubectl)
            .arg("--minikube-bin")
            .arg(minikube);
        if let Some(docker) = docker {
            cmd.arg("--docker-bin").arg(docker);
        }
    }

    #[test]
    fn apply_only_run_succeeds_and_reports_access_url() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        let kubectl = kubectl(&dir, "");
        let minikube = minikube(&dir);

        let mut cmd = stackup(&dir);
        cmd.arg("--apply-only");
        tools(&mut cmd, &kubectl, &minikube, None);
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("apply_only succeeded in namespace 'demo'"))
            .stdout(predicate::str::contains("Access: http://127.0.0.1:30080"));

        let calls = log(&dir, "kubectl");
        assert!(calls.contains("create namespace demo --dry-run=client -o yaml"));
        assert!(calls.contains("--request-timeout=30s apply -f -"));
        assert!(calls.contains("get statefulset db -n demo -o json"));
        assert!(calls.contains("get deployment worker -n demo -o json"));
        assert!(!log(&dir, "minikube").contains("image load"));
    }

    #[test]
    fn skip_build_loads_images_without_docker() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        let kubectl = kubectl(&dir, "");
        let minikube = minikube(&dir);

        let mut cmd = stackup(&dir);
        cmd.arg("--skip-build");
        tools(&mut cmd, &kubectl, &minikube, None);
        cmd.assert().success();

        assert!(log(&dir, "minikube").contains("image load web:dev"));
        assert!(log(&dir, "docker").is_empty());
    }

    #[test]
    fn rejected_manifest_exits_with_apply_code() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        let kubectl = kubectl(
            &dir,
            r#"  *"apply -n demo -f "*worker.yaml*) echo "error: admission webhook denied the request" >&2; exit 1 ;;"#,
        );
        let minikube = minikube(&dir);

        let mut cmd = stackup(&dir);
        cmd.arg("--apply-only");
        tools(&mut cmd, &kubectl, &minikube, None);
        cmd.assert()
            .code(4)
            .stderr(predicate::str::contains("apply failure"))
            .stderr(predicate::str::contains("apply failed for worker"));
    }

    #[test]
    fn failing_build_exits_with_build_code_before_any_apply() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        let kubectl = kubectl(&dir, "");
        let minikube = minikube(&dir);
        let docker = docker(&dir, "echo 'COPY failed: file not found' >&2\nexit 1");

        let mut cmd = stackup(&dir);
        tools(&mut cmd, &kubectl, &minikube, Some(&docker));
        cmd.assert()
            .code(3)
            .stderr(predicate::str::contains("COPY failed"));

        assert!(log(&dir, "docker").contains("build -t web:dev"));
        assert!(!log(&dir, "kubectl").contains("apply -n"));
    }

    #[test]
    fn missing_workload_times_out_with_readiness_code() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        let kubectl = kubectl(
            &dir,
            r#"  *" get statefulset db "*) echo 'Error from server (NotFound): statefulsets.apps "db" not found' >&2; exit 1 ;;"#,
        );
        let minikube = minikube(&dir);

        let mut cmd = stackup(&dir);
        cmd.args(["--apply-only", "--json", "--infra-timeout", "1", "--poll-interval", "1"]);
        tools(&mut cmd, &kubectl, &minikube, None);
        let out = cmd.assert().code(5).get_output().stdout.clone();

        let result: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(result["outcome"]["status"], "failed");
        assert_eq!(result["outcome"]["category"], "readiness");
        assert!(!log(&dir, "kubectl").contains("web.yaml"));
    }

    #[test]
    fn failing_hook_exits_with_hook_code() {
        let dir = TempDir::new().unwrap();
        init_project(&dir);
        std::fs::write(dir.path().join("stackup.yaml"), format!("{CONFIG}{HOOKS}")).unwrap();
        let kubectl = kubectl(
            &dir,
            r#"  *"rollout restart"*) echo 'error: deployments.apps "db-admin" not found' >&2; exit 1 ;;"#,
        );
        let minikube = minikube(&dir);

        let mut cmd = stackup(&dir);
        cmd.arg("--apply-only");
        tools(&mut cmd, &kubectl, &minikube, None);
        cmd.assert()
            .code(6)
            .stderr(predicate::str::contains("hook failure"))
            .stderr(predicate::str::contains("restart deployment/db-admin"));

        assert!(!log(&dir, "kubectl").contains("web.yaml"));
    }

    #[test]
    fn cleanup_deletes_namespace_without_minikube() {
        let dir = TempDir::new().unwrap();
        let kubectl = kubectl(&dir, "");

        stackup(&dir)
            .args(["--cleanup", "-n", "demo", "--kubectl-bin"])
            .arg(&kubectl)
            .assert()
            .success()
            .stdout(predicate::str::contains("cleanup succeeded in namespace 'demo'"));

        assert!(log(&dir, "kubectl")
            .contains("delete namespace demo --ignore-not-found=true --wait=true"));
    }
}
