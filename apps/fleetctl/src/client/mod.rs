mod commands;

use anyhow::Context;
use fleet_core::proto::{Envelope, Request, Response};
use fleet_ipc::framing::{self, FramedStream};
use fleet_utils::runtime_paths;

pub use commands::backup::{backup_delete, backup_list, backup_now, backup_show};
pub use commands::core::{ping, shutdown, status};
pub use commands::players::{online, sync_players, sync_save};
pub use commands::whitelist::{whitelist_add, whitelist_list, whitelist_remove};

pub(crate) async fn connect_only() -> anyhow::Result<FramedStream> {
    let paths = runtime_paths();
    fleet_ipc::socket::connect(&paths.socket_path)
        .await
        .map(framing::framed)
        .with_context(|| {
            format!(
                "fleetd is not running (no socket at {})",
                paths.socket_path.display()
            )
        })
}

/// Sends one request on a fresh connection and returns the payload. Daemon-side errors
/// come back as `Err`.
pub(crate) async fn request(payload: Request) -> anyhow::Result<Response> {
    let mut framed = connect_only().await?;
    framing::send_request(&mut framed, &Envelope { id: 1, payload }).await?;
    let resp = framing::read_response(&mut framed).await?;
    match resp.payload {
        Response::Error(err) => Err(anyhow::anyhow!("{:?}: {}", err.code, err.message)),
        other => Ok(other),
    }
}

pub(crate) fn unexpected(resp: Response) -> anyhow::Error {
    anyhow::anyhow!("unexpected response: {resp:?}")
}
