use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use fleet_core::FleetError;
use fleet_core::model::OnlinePlayer;

use super::{GameClient, KICK_MESSAGE, bare_steam_id, steam_user_id};

pub struct RestClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PlayersResponse {
    #[serde(default)]
    players: Vec<RestPlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestPlayer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    player_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    ping: f64,
    #[serde(default, rename = "location_x")]
    location_x: f64,
    #[serde(default, rename = "location_y")]
    location_y: f64,
    #[serde(default)]
    level: i32,
}

#[derive(Debug, Serialize)]
struct KickRequest<'a> {
    userid: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct AnnounceRequest<'a> {
    message: &'a str,
}

impl RestClient {
    pub fn new(address: &str, username: &str, password: &str, timeout: Duration) -> Result<Self, FleetError> {
        let base_url = Url::parse(address)
            .map_err(|err| FleetError::InvalidAddress(format!("{address}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FleetError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FleetError> {
        self.base_url
            .join(path)
            .map_err(|err| FleetError::InvalidAddress(format!("{}{path}: {err}", self.base_url)))
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), FleetError> {
        let url = self.endpoint(path)?;
        self.client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| FleetError::protocol(format!("POST {path}: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl GameClient for RestClient {
    async fn list_online_players(&self) -> Result<Vec<OnlinePlayer>, FleetError> {
        let url = self.endpoint("/v1/api/players")?;
        let response: PlayersResponse = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| FleetError::protocol(format!("GET /v1/api/players: {err}")))?
            .json()
            .await
            .map_err(|err| FleetError::protocol(format!("players response: {err}")))?;

        Ok(response.players.into_iter().map(RestPlayer::into_online).collect())
    }

    async fn disconnect_player(&self, steam_id: &str) -> Result<(), FleetError> {
        let userid = steam_user_id(steam_id);
        self.post(
            "/v1/api/kick",
            &KickRequest {
                userid: &userid,
                message: KICK_MESSAGE,
            },
        )
        .await
    }

    async fn broadcast(&self, message: &str) -> Result<(), FleetError> {
        self.post("/v1/api/announce", &AnnounceRequest { message }).await
    }
}

impl RestPlayer {
    fn into_online(self) -> OnlinePlayer {
        let steam_id = Some(bare_steam_id(&self.user_id).to_string()).filter(|id| !id.is_empty());
        OnlinePlayer {
            server_id: String::new(),
            player_uid: self.player_id,
            steam_id,
            nickname: self.name,
            ip: Some(self.ip).filter(|ip| !ip.is_empty()),
            ping: self.ping,
            location_x: self.location_x,
            location_y: self.location_y,
            level: self.level,
            last_online: Utc::now(),
        }
    }
}
