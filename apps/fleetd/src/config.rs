use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use fleet_core::FleetError;

pub const DEFAULT_KEEP_DAYS: u32 = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub task: TaskConfig,
    pub save: SaveConfig,
    pub manage: ManageConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    /// Legacy single-server settings; folded into a `default` server when `servers` is empty.
    pub rcon: Option<RconConfig>,
    pub rest: Option<RestConfig>,
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Player sync interval in seconds; 0 disables the timer.
    pub sync_interval: u64,
    pub player_logging: bool,
    pub player_login_message: String,
    pub player_logout_message: String,
    pub broadcast_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Legacy single-server save origin.
    pub path: Option<String>,
    pub sync_interval: u64,
    pub backup_interval: u64,
    pub backup_keep_days: u32,
    pub decode_path: Option<PathBuf>,
    pub decode_timeout_secs: u64,
    pub decode_request_url: Option<String>,
    pub decode_token: Option<String>,
    /// Binaries used for `k8s://` and `docker://` origins; looked up on `PATH` by default.
    pub kubectl_path: PathBuf,
    pub docker_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManageConfig {
    pub kick_non_whitelist: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop a timer fire while the previous run of the same task is still going.
    #[default]
    Skip,
    /// Let same-task runs overlap.
    Allow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_age_secs: u64,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconConfig {
    pub address: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_base64: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    pub address: String,
    #[serde(default = "default_rest_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSaveConfig {
    /// Save origin: local path, http(s) URL, `k8s://...` or `docker://...`.
    pub path: Option<String>,
    pub decode_path: Option<PathBuf>,
    pub backup_keep_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rcon: Option<RconConfig>,
    #[serde(default)]
    pub rest: Option<RestConfig>,
    #[serde(default)]
    pub save: ServerSaveConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            sync_interval: 60,
            player_logging: false,
            player_login_message: "player {username} joined {server_name} ({online_num} online)"
                .to_string(),
            player_logout_message: "player {username} left {server_name} ({online_num} online)"
                .to_string(),
            broadcast_delay_ms: 1000,
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_interval: 600,
            backup_interval: 14400,
            backup_keep_days: DEFAULT_KEEP_DAYS,
            decode_path: None,
            decode_timeout_secs: 600,
            decode_request_url: None,
            decode_token: None,
            kubectl_path: PathBuf::from("kubectl"),
            docker_path: PathBuf::from("docker"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 5,
            max_age_secs: 3600,
            interval_secs: 300,
        }
    }
}

impl TaskConfig {
    pub fn sync_every(&self) -> Option<Duration> {
        secs(self.sync_interval)
    }

    pub fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }
}

impl SaveConfig {
    pub fn sync_every(&self) -> Option<Duration> {
        secs(self.sync_interval)
    }

    pub fn backup_every(&self) -> Option<Duration> {
        secs(self.backup_interval)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs.max(1))
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn every(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> Result<PathBuf, FleetError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        if let Some(base) = dirs::data_dir() {
            return Ok(base.join("fleetd"));
        }
        if let Some(home) = dirs::home_dir() {
            return Ok(home.join(".fleetd"));
        }
        Err(FleetError::Configuration(
            "unable to resolve a writable data directory".to_string(),
        ))
    }

    pub fn resolved_backup_dir(&self) -> Result<PathBuf, FleetError> {
        match &self.backup_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.resolved_data_dir()?.join("backups")),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf, FleetError> {
        Ok(self.resolved_data_dir()?.join("fleet.redb"))
    }
}

impl ServerConfig {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.save
            .path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    /// Retention window: server override, then the fleet-wide value, then seven days.
    pub fn keep_days(&self, fleet_default: u32) -> u32 {
        match self.save.backup_keep_days {
            Some(days) if days > 0 => days,
            _ if fleet_default > 0 => fleet_default,
            _ => DEFAULT_KEEP_DAYS,
        }
    }
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, FleetError> {
        let content = fs::read_to_string(path)
            .map_err(|err| FleetError::Configuration(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, FleetError> {
        let mut config = toml::from_str::<FleetConfig>(content)
            .map_err(|err| FleetError::Configuration(format!("failed to parse config: {err}")))?;
        config.migrate_legacy();
        config.validate()?;
        Ok(config)
    }

    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.id == id)
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|server| server.enabled)
    }

    fn migrate_legacy(&mut self) {
        if !self.servers.is_empty() {
            return;
        }
        let Some(rcon) = self.rcon.clone().filter(|rcon| !rcon.address.trim().is_empty()) else {
            return;
        };
        info!("migrating legacy single-server config to a `default` server");
        self.servers.push(ServerConfig {
            id: "default".to_string(),
            name: "Default Server".to_string(),
            description: "Migrated from legacy configuration".to_string(),
            enabled: true,
            rcon: Some(rcon),
            rest: self.rest.clone(),
            save: ServerSaveConfig {
                path: self.save.path.clone(),
                decode_path: self.save.decode_path.clone(),
                backup_keep_days: Some(self.save.backup_keep_days),
            },
        });
    }

    fn validate(&self) -> Result<(), FleetError> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            let id = server.id.trim();
            if id.is_empty() {
                return Err(FleetError::Configuration("server id must not be empty".into()));
            }
            // `_` separates the server id from the entity id in store keys.
            if id.contains('_') {
                return Err(FleetError::Configuration(format!(
                    "server id `{id}` must not contain `_`"
                )));
            }
            if id != server.id {
                return Err(FleetError::Configuration(format!(
                    "server id `{}` has surrounding whitespace",
                    server.id
                )));
            }
            if !seen.insert(id) {
                return Err(FleetError::Configuration(format!("duplicate server id `{id}`")));
            }
        }
        Ok(())
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_rest_username() -> String {
    "admin".to_string()
}
