//! Per-server game protocol clients.

mod rcon;
mod rest;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fleet_core::FleetError;
use fleet_core::model::OnlinePlayer;

use crate::config::ServerConfig;

pub use rcon::RconConsole;
pub use rest::RestClient;

/// Message shown to players removed by whitelist enforcement.
pub const KICK_MESSAGE: &str = "You are not on the whitelist of this server.";

#[async_trait]
pub trait GameClient: Send + Sync {
    /// Players currently connected. `server_id` is left empty for the caller to fill.
    async fn list_online_players(&self) -> Result<Vec<OnlinePlayer>, FleetError>;

    /// Disconnects the player with this bare Steam id.
    async fn disconnect_player(&self, steam_id: &str) -> Result<(), FleetError>;

    async fn broadcast(&self, message: &str) -> Result<(), FleetError>;
}

pub trait ClientFactory: Send + Sync {
    fn client_for(&self, server: &ServerConfig) -> Result<Arc<dyn GameClient>, FleetError>;
}

/// REST when the server has it configured, otherwise RCON.
pub struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn client_for(&self, server: &ServerConfig) -> Result<Arc<dyn GameClient>, FleetError> {
        if let Some(rest) = server.rest.as_ref().filter(|rest| !rest.address.trim().is_empty()) {
            return Ok(Arc::new(RestClient::new(
                &rest.address,
                &rest.username,
                &rest.password,
                Duration::from_secs(rest.timeout.max(1)),
            )?));
        }
        if let Some(rcon) = server.rcon.as_ref().filter(|rcon| !rcon.address.trim().is_empty()) {
            let mut settings = fleet_rcon::RconSettings::new(&rcon.address, &rcon.password);
            settings.use_base64 = rcon.use_base64;
            settings.timeout = Duration::from_secs(rcon.timeout.max(1));
            return Ok(Arc::new(RconConsole::new(settings)));
        }
        Err(FleetError::Configuration(format!(
            "server `{}` has neither REST nor RCON configured",
            server.id
        )))
    }
}

/// Wire form of a Steam id, as both protocols expect it.
pub(crate) fn steam_user_id(steam_id: &str) -> String {
    let bare = bare_steam_id(steam_id);
    format!("steam_{bare}")
}

pub(crate) fn bare_steam_id(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("steam_").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RconConfig, RestConfig, ServerSaveConfig};

    fn server(rest: Option<&str>, rcon: Option<&str>) -> ServerConfig {
        ServerConfig {
            id: "srv1".into(),
            name: String::new(),
            description: String::new(),
            enabled: true,
            rcon: rcon.map(|address| RconConfig {
                address: address.into(),
                password: "pw".into(),
                use_base64: false,
                timeout: 5,
            }),
            rest: rest.map(|address| RestConfig {
                address: address.into(),
                username: "admin".into(),
                password: "pw".into(),
                timeout: 5,
            }),
            save: ServerSaveConfig::default(),
        }
    }

    #[test]
    fn steam_ids_are_normalised_for_the_wire() {
        assert_eq!(steam_user_id("765"), "steam_765");
        assert_eq!(steam_user_id("steam_765"), "steam_765");
        assert_eq!(bare_steam_id(" steam_765 "), "765");
    }

    #[test]
    fn factory_requires_some_protocol() {
        assert!(DefaultClientFactory.client_for(&server(Some("http://127.0.0.1:8212"), None)).is_ok());
        assert!(DefaultClientFactory.client_for(&server(None, Some("127.0.0.1:25575"))).is_ok());

        let err = DefaultClientFactory.client_for(&server(None, None)).err().expect("error");
        assert!(matches!(err, FleetError::Configuration(_)));
    }
}
