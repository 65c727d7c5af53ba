//! Whitelist storage and enforcement.

use tracing::{error, info, warn};

use fleet_core::FleetError;
use fleet_core::model::{OnlinePlayer, WhitelistEntry};

use crate::client::GameClient;
use crate::store::{Bucket, NamespacedStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnforcementReport {
    /// Player uids that were disconnected.
    pub disconnected: Vec<String>,
    /// Unlisted players that could not be disconnected because they carry no Steam id.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

pub fn list(store: &NamespacedStore, server_id: &str) -> Result<Vec<WhitelistEntry>, FleetError> {
    store.list_by_server(Bucket::Whitelist, server_id)
}

pub fn add(store: &NamespacedStore, server_id: &str, mut entry: WhitelistEntry) -> Result<WhitelistEntry, FleetError> {
    let entity_id = entry
        .entity_id()
        .map(str::to_string)
        .ok_or_else(|| FleetError::InvalidRequest("whitelist entry needs a player uid or steam id".into()))?;
    entry.server_id = server_id.to_string();
    store.put(Bucket::Whitelist, server_id, &entity_id, &entry)?;
    Ok(entry)
}

/// Removes every entry whose player uid or Steam id equals `identifier`.
pub fn remove(store: &NamespacedStore, server_id: &str, identifier: &str) -> Result<usize, FleetError> {
    let identifier = identifier.trim();
    let doomed: Vec<String> = list(store, server_id)?
        .iter()
        .filter(|entry| {
            entry.player_uid.as_deref() == Some(identifier) || entry.steam_id.as_deref() == Some(identifier)
        })
        .filter_map(|entry| entry.entity_id().map(str::to_string))
        .collect();
    if doomed.is_empty() {
        return Err(FleetError::NotFound(format!(
            "whitelist entry `{identifier}` on server `{server_id}`"
        )));
    }
    for entity_id in &doomed {
        store.delete(Bucket::Whitelist, server_id, entity_id)?;
    }
    Ok(doomed.len())
}

/// Swaps the server's whole whitelist in one transaction.
pub fn replace(store: &NamespacedStore, server_id: &str, entries: Vec<WhitelistEntry>) -> Result<usize, FleetError> {
    let mut records = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let entity_id = entry.entity_id().map(str::to_string).ok_or_else(|| {
            FleetError::InvalidRequest(format!(
                "whitelist entry `{}` needs a player uid or steam id",
                entry.name
            ))
        })?;
        entry.server_id = server_id.to_string();
        records.push((entity_id, entry));
    }
    store.replace_all_for_server(Bucket::Whitelist, server_id, &records)?;
    Ok(records.len())
}

/// Disconnects every online player the whitelist does not cover. Never fails: problems are
/// logged and show up in the report.
pub async fn enforce(
    store: &NamespacedStore,
    client: &dyn GameClient,
    server_id: &str,
    players: &[OnlinePlayer],
) -> EnforcementReport {
    let mut report = EnforcementReport::default();
    let whitelist = match list(store, server_id) {
        Ok(entries) => entries,
        Err(err) => {
            error!(server = %server_id, "failed to load whitelist, skipping enforcement: {err}");
            return report;
        }
    };

    for player in players {
        if whitelist.iter().any(|entry| entry.matches(player)) {
            continue;
        }
        let Some(steam_id) = player.steam_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            warn!(
                server = %server_id,
                player = %player.nickname,
                uid = %player.player_uid,
                "player is not whitelisted but has no steam id, cannot disconnect"
            );
            report.skipped.push(player.player_uid.clone());
            continue;
        };
        match client.disconnect_player(steam_id).await {
            Ok(()) => {
                info!(server = %server_id, player = %player.nickname, "disconnected non-whitelisted player");
                report.disconnected.push(player.player_uid.clone());
            }
            Err(err) => {
                warn!(server = %server_id, player = %player.nickname, "failed to disconnect player: {err}");
                report.failed.push(player.player_uid.clone());
            }
        }
    }
    report
}
