use serde::{Deserialize, Serialize};

use super::{RequestId, RpcError, ServerId, TaskKind, UnixMillis};
use crate::model::{BackupRecord, OnlinePlayer, WhitelistEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: RequestId,
    pub payload: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    Ping { client_version: String, protocol_version: u32 },

    Status {},

    /// Poll one server now. With `wait = false` the daemon only validates the server and
    /// acknowledges; the sync itself runs in the background.
    SyncPlayers { server: ServerId, wait: bool },
    SyncSave { server: ServerId, wait: bool },
    BackupNow { server: ServerId },

    ListBackups {
        server: ServerId,
        #[serde(default)]
        start_ms: Option<UnixMillis>,
        #[serde(default)]
        end_ms: Option<UnixMillis>,
    },
    GetBackup { server: ServerId, backup_id: String },
    DeleteBackup { server: ServerId, backup_id: String },

    ListOnlinePlayers { server: ServerId },

    ListWhitelist { server: ServerId },
    AddWhitelist { server: ServerId, entry: WhitelistEntry },
    RemoveWhitelist { server: ServerId, identifier: String },
    PutWhitelist { server: ServerId, entries: Vec<WhitelistEntry> },

    Shutdown {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    Pong { daemon_version: String, protocol_version: u32 },

    Status { daemon: DaemonStatus, servers: Vec<ServerSummary> },

    Accepted { server: ServerId, task: TaskKind },
    PlayersSynced { server: ServerId, online: usize, joined: usize, left: usize, disconnected: usize },
    SaveSynced { server: ServerId },

    BackupCreated { record: BackupRecord },
    Backups { records: Vec<BackupRecord> },
    Backup { record: BackupRecord, archive_path: String },
    BackupDeleted { backup_id: String },

    OnlinePlayers { players: Vec<OnlinePlayer> },

    Whitelist { entries: Vec<WhitelistEntry> },
    WhitelistUpdated {},

    ShutdownAck {},

    Error(RpcError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub daemon_version: String,
    pub protocol_version: u32,
    pub pid: u32,
    pub uptime_ms: u64,
    pub running_tasks: Vec<TaskKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    pub id: ServerId,
    pub name: String,
    pub enabled: bool,
    pub online_players: usize,
    pub backups: usize,
}
