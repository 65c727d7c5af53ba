use serde::{Deserialize, Serialize};

pub type RequestId = u64;
pub type UnixMillis = u64;

pub type ServerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    PlayerSync,
    SaveSync,
    Backup,
    CacheEviction,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::PlayerSync,
        TaskKind::SaveSync,
        TaskKind::Backup,
        TaskKind::CacheEviction,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::PlayerSync => "player-sync",
            TaskKind::SaveSync => "save-sync",
            TaskKind::Backup => "backup",
            TaskKind::CacheEviction => "cache-eviction",
        }
    }
}
