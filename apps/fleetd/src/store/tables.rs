//! redb table definitions for the fleet store.
//!
//! Each table uses `&str` keys of the form `{server_id}_{entity_id}` and `&[u8]` values
//! (JSON-serialized records from `fleet_core::model`).

use redb::TableDefinition;

/// Latest polled online players, keyed by `{server_id}_{player_uid}`. Replaced every poll.
pub const ONLINE_PLAYERS: TableDefinition<&str, &[u8]> = TableDefinition::new("online_players");

/// Whitelist entries keyed by `{server_id}_{player_uid or steam_id}`.
pub const WHITELIST: TableDefinition<&str, &[u8]> = TableDefinition::new("whitelist");

/// Backup records keyed by `{server_id}_{backup_id}`.
pub const BACKUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("backups");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    OnlinePlayers,
    Whitelist,
    Backups,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::OnlinePlayers, Bucket::Whitelist, Bucket::Backups];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::OnlinePlayers => "online_players",
            Bucket::Whitelist => "whitelist",
            Bucket::Backups => "backups",
        }
    }
}
