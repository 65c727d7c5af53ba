//! External save decoder invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use fleet_core::FleetError;

use crate::config::{SaveConfig, ServerConfig};
use crate::source::ResolvedSource;

pub const LEVEL_FILE: &str = "Level.sav";

#[async_trait]
pub trait SaveDecoder: Send + Sync {
    async fn decode(&self, server: &ServerConfig, source: &ResolvedSource) -> Result<(), FleetError>;
}

/// Runs the `sav_cli` tool against the level file of a resolved save.
pub struct SavCliDecoder {
    default_path: Option<PathBuf>,
    request_url: Option<String>,
    token: Option<String>,
    timeout: Duration,
}

impl SavCliDecoder {
    pub fn from_config(save: &SaveConfig) -> Self {
        Self {
            default_path: save.decode_path.clone(),
            request_url: save.decode_request_url.clone(),
            token: save.decode_token.clone(),
            timeout: save.decode_timeout(),
        }
    }

    fn tool_path(&self, server: &ServerConfig) -> Result<PathBuf, FleetError> {
        let configured = server
            .save
            .decode_path
            .clone()
            .or_else(|| self.default_path.clone())
            .filter(|path| !path.as_os_str().is_empty());
        let path = match configured {
            Some(path) => path,
            None => bundled_tool_path()?,
        };
        if !path.is_file() {
            return Err(FleetError::Configuration(format!(
                "decoder not found at {}",
                path.display()
            )));
        }
        Ok(path)
    }

    fn args(&self, server: &ServerConfig, level_file: &Path) -> Result<Vec<String>, FleetError> {
        let Some(url) = self.request_url.as_deref().filter(|url| !url.trim().is_empty()) else {
            return Err(FleetError::Configuration(
                "save.decode_request_url is not set".to_string(),
            ));
        };
        let mut args = vec![
            "-f".to_string(),
            level_file.display().to_string(),
            "--request".to_string(),
            url.replace("{server_id}", &server.id),
        ];
        if let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) {
            args.push("--token".to_string());
            args.push(token.to_string());
        }
        Ok(args)
    }
}

#[async_trait]
impl SaveDecoder for SavCliDecoder {
    async fn decode(&self, server: &ServerConfig, source: &ResolvedSource) -> Result<(), FleetError> {
        let tool = self.tool_path(server)?;
        let level_file = source.find_file(LEVEL_FILE).ok_or_else(|| {
            FleetError::SourceUnavailable(format!("no {LEVEL_FILE} in resolved save"))
        })?;
        let args = self.args(server, &level_file)?;
        debug!(server = %server.id, tool = %tool.display(), "running save decoder");

        let mut cmd = Command::new(&tool);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                FleetError::protocol(format!("decoder timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|err| FleetError::io("running save decoder", err))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::protocol(format!(
                "decoder exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        info!(server = %server.id, "save decoded");
        Ok(())
    }
}

fn bundled_tool_path() -> Result<PathBuf, FleetError> {
    let exe = std::env::current_exe().map_err(|err| FleetError::io("locating executable", err))?;
    let dir = exe
        .parent()
        .ok_or_else(|| FleetError::Configuration("executable has no parent dir".to_string()))?;
    let name = if cfg!(windows) { "sav_cli.exe" } else { "sav_cli" };
    Ok(dir.join(name))
}
