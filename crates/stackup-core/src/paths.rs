use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "stackup.yaml";
pub const MANIFEST_DIR: &str = "deploy/minikube/k8s";
pub const DOCKER_DIR: &str = "docker";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a config-relative path against the project root. Absolute paths
/// are returned unchanged.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
