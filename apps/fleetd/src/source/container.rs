use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use fleet_core::FleetError;

/// Where to find the copy tools for container origins.
#[derive(Debug, Clone)]
pub struct ContainerTools {
    pub kubectl: PathBuf,
    pub docker: PathBuf,
}

impl Default for ContainerTools {
    fn default() -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            docker: PathBuf::from("docker"),
        }
    }
}

pub(super) async fn copy_from_pod(
    kubectl: &Path,
    namespace: &str,
    pod: &str,
    container: &str,
    remote_path: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<(), FleetError> {
    let target = dest.join(remote_file_name(remote_path));
    let mut cmd = Command::new(kubectl);
    cmd.arg("cp")
        .arg("-n")
        .arg(namespace)
        .arg("-c")
        .arg(container)
        .arg(format!("{pod}:{remote_path}"))
        .arg(&target);
    run(cmd, "kubectl cp", timeout).await
}

pub(super) async fn copy_from_container(
    docker: &Path,
    container: &str,
    remote_path: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<(), FleetError> {
    let target = dest.join(remote_file_name(remote_path));
    let mut cmd = Command::new(docker);
    cmd.arg("cp").arg(format!("{container}:{remote_path}")).arg(&target);
    run(cmd, "docker cp", timeout).await
}

async fn run(mut cmd: Command, what: &str, timeout: Duration) -> Result<(), FleetError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    debug!(command = ?cmd.as_std(), "copying save out of container");

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            FleetError::SourceUnavailable(format!("{what} timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|err| FleetError::SourceUnavailable(format!("failed to run {what}: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::SourceUnavailable(format!(
            "{what} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn remote_file_name(remote_path: &str) -> &str {
    remote_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("source")
}
