use fleet_core::proto::{Request, Response};

use crate::client::{request, unexpected};

pub async fn sync_players(server: String, wait: bool) -> anyhow::Result<String> {
    match request(Request::SyncPlayers { server, wait }).await? {
        Response::PlayersSynced { server, online, joined, left, disconnected } => Ok(format!(
            "{server}: {online} online, {joined} joined, {left} left, {disconnected} disconnected"
        )),
        Response::Accepted { server, task } => Ok(format!("{server}: {} queued", task.as_str())),
        other => Err(unexpected(other)),
    }
}

pub async fn sync_save(server: String, wait: bool) -> anyhow::Result<String> {
    match request(Request::SyncSave { server, wait }).await? {
        Response::SaveSynced { server } => Ok(format!("{server}: save decoded")),
        Response::Accepted { server, task } => Ok(format!("{server}: {} queued", task.as_str())),
        other => Err(unexpected(other)),
    }
}

pub async fn online(server: String) -> anyhow::Result<String> {
    match request(Request::ListOnlinePlayers { server }).await? {
        Response::OnlinePlayers { players } => {
            if players.is_empty() {
                return Ok("nobody online".to_string());
            }
            Ok(players
                .iter()
                .map(|player| {
                    format!(
                        "{:<20} uid={:<16} steam={}",
                        player.nickname,
                        player.player_uid,
                        player.steam_id.as_deref().unwrap_or("-")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        other => Err(unexpected(other)),
    }
}
