use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use minecraft_client_rs::Client;
use std::time::Duration;
use tokio::task::spawn_blocking;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RconSettings {
    pub address: String,
    pub password: String,
    /// Send commands and read replies base64-encoded (servers patched for non-ASCII text).
    pub use_base64: bool,
    pub timeout: Duration,
}

impl RconSettings {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            use_base64: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct RconClient {
    settings: RconSettings,
}

impl RconClient {
    pub fn new(settings: RconSettings) -> Self {
        Self { settings }
    }

    /// Runs one command over a fresh connection. The whole exchange is bounded by the
    /// configured timeout; a blocked socket thread is abandoned, not joined.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let address = self.settings.address.clone();
        let password = self.settings.password.clone();
        let use_base64 = self.settings.use_base64;
        let command = encode_command(command, use_base64);

        let task = spawn_blocking(move || {
            let mut client = Client::new(address)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            client
                .authenticate(password)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            let response = client
                .send_command(command)
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            client
                .close()
                .map_err(|err| anyhow::anyhow!(err.to_string()))?;
            Ok::<_, anyhow::Error>(response.body)
        });

        let body = tokio::time::timeout(self.settings.timeout, task)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "RCON command timed out after {}s",
                    self.settings.timeout.as_secs()
                )
            })?
            .with_context(|| "RCON task failed")??;

        Ok(decode_reply(&body, use_base64))
    }
}

fn encode_command(command: &str, use_base64: bool) -> String {
    if use_base64 {
        STANDARD.encode(command.as_bytes())
    } else {
        command.to_string()
    }
}

fn decode_reply(body: &str, use_base64: bool) -> String {
    if !use_base64 {
        return body.to_string();
    }
    STANDARD
        .decode(body.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| body.to_string())
}
