use async_trait::async_trait;

use fleet_core::FleetError;
use fleet_core::model::OnlinePlayer;
use fleet_rcon::{RconClient, RconSettings};

use super::{GameClient, bare_steam_id, steam_user_id};

pub struct RconConsole {
    client: RconClient,
}

impl RconConsole {
    pub fn new(settings: RconSettings) -> Self {
        Self {
            client: RconClient::new(settings),
        }
    }

    async fn run(&self, command: &str) -> Result<String, FleetError> {
        self.client
            .execute(command)
            .await
            .map_err(|err| FleetError::protocol(format!("rcon `{}`: {err:#}", verb(command))))
    }
}

#[async_trait]
impl GameClient for RconConsole {
    async fn list_online_players(&self) -> Result<Vec<OnlinePlayer>, FleetError> {
        let reply = self.run("ShowPlayers").await?;
        Ok(parse_show_players(&reply))
    }

    async fn disconnect_player(&self, steam_id: &str) -> Result<(), FleetError> {
        self.run(&format!("KickPlayer {}", steam_user_id(steam_id))).await?;
        Ok(())
    }

    async fn broadcast(&self, message: &str) -> Result<(), FleetError> {
        self.run(&format!("Broadcast {message}")).await?;
        Ok(())
    }
}

fn verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

/// Parses `name,playeruid,steamid` rows. Names may contain commas, so the two id columns
/// are taken from the right.
fn parse_show_players(reply: &str) -> Vec<OnlinePlayer> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.eq_ignore_ascii_case("name,playeruid,steamid"))
        .filter_map(|line| {
            let mut columns = line.rsplitn(3, ',');
            let steam_id = columns.next()?.trim();
            let player_uid = columns.next()?.trim();
            let name = columns.next()?.trim();
            let mut player = OnlinePlayer::new(player_uid, name);
            let steam_id = bare_steam_id(steam_id);
            if !steam_id.is_empty() && steam_id != "00000000" {
                player.steam_id = Some(steam_id.to_string());
            }
            Some(player)
        })
        .collect()
}
