//! Records shared between the daemon, its store and the control socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A player connected to a server at one poll instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlinePlayer {
    pub server_id: String,
    pub player_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<String>,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub ping: f64,
    #[serde(default)]
    pub location_x: f64,
    #[serde(default)]
    pub location_y: f64,
    #[serde(default)]
    pub level: i32,
    pub last_online: DateTime<Utc>,
}

impl OnlinePlayer {
    pub fn new(player_uid: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            server_id: String::new(),
            player_uid: player_uid.into(),
            steam_id: None,
            nickname: nickname.into(),
            ip: None,
            ping: 0.0,
            location_x: 0.0,
            location_y: 0.0,
            level: 0,
            last_online: Utc::now(),
        }
    }

    pub fn with_steam_id(mut self, steam_id: impl Into<String>) -> Self {
        self.steam_id = Some(steam_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<String>,
}

impl WhitelistEntry {
    /// Store entity id: the player uid when present, otherwise the Steam id.
    pub fn entity_id(&self) -> Option<&str> {
        non_empty(self.player_uid.as_deref()).or_else(|| non_empty(self.steam_id.as_deref()))
    }

    pub fn matches(&self, player: &OnlinePlayer) -> bool {
        let uid_match = !player.player_uid.is_empty()
            && non_empty(self.player_uid.as_deref()) == Some(player.player_uid.as_str());
        let steam_match = match non_empty(player.steam_id.as_deref()) {
            Some(steam_id) => non_empty(self.steam_id.as_deref()) == Some(steam_id),
            None => false,
        };
        uid_match || steam_match
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub server_id: String,
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    /// Archive path relative to the server's backup directory.
    pub path: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
