use fleet_core::model::WhitelistEntry;
use fleet_core::proto::{Request, Response};

use crate::client::{request, unexpected};

pub async fn whitelist_list(server: String) -> anyhow::Result<String> {
    match request(Request::ListWhitelist { server }).await? {
        Response::Whitelist { entries } if entries.is_empty() => Ok("whitelist is empty".to_string()),
        Response::Whitelist { entries } => Ok(entries
            .iter()
            .map(|entry| {
                format!(
                    "{:<20} uid={:<16} steam={}",
                    entry.name,
                    entry.player_uid.as_deref().unwrap_or("-"),
                    entry.steam_id.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        other => Err(unexpected(other)),
    }
}

pub async fn whitelist_add(
    server: String,
    name: String,
    player_uid: Option<String>,
    steam_id: Option<String>,
) -> anyhow::Result<String> {
    if player_uid.is_none() && steam_id.is_none() {
        anyhow::bail!("pass --uid or --steam-id");
    }
    let entry = WhitelistEntry {
        server_id: server.clone(),
        name,
        player_uid,
        steam_id,
    };
    match request(Request::AddWhitelist { server, entry }).await? {
        Response::WhitelistUpdated {} => Ok("whitelist updated".to_string()),
        other => Err(unexpected(other)),
    }
}

pub async fn whitelist_remove(server: String, identifier: String) -> anyhow::Result<String> {
    match request(Request::RemoveWhitelist { server, identifier }).await? {
        Response::WhitelistUpdated {} => Ok("whitelist updated".to_string()),
        other => Err(unexpected(other)),
    }
}
