use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleet_core::proto::*;
use fleet_core::{FleetError, PROTOCOL_VERSION};
use fleet_ipc::framing;
use fleet_utils::now_millis;

use crate::fleet::Fleet;
use crate::scheduler::Scheduler;
use crate::whitelist;

pub struct Daemon {
    scheduler: Arc<Scheduler>,
    started_ms: u64,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(scheduler: Arc<Scheduler>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            started_ms: now_millis(),
            shutdown,
        })
    }

    fn fleet(&self) -> &Arc<Fleet> {
        self.scheduler.fleet()
    }
}

/// Accepts control connections until the shutdown token fires.
pub async fn serve(listener: UnixListener, daemon: Arc<Daemon>) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = daemon.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let daemon = Arc::clone(&daemon);
                tokio::spawn(async move {
                    if let Err(err) = handle_conn(stream, daemon).await {
                        debug!("control connection closed: {err}");
                    }
                });
            }
        }
    }
    info!("control socket closed");
    Ok(())
}

async fn handle_conn(stream: UnixStream, daemon: Arc<Daemon>) -> std::io::Result<()> {
    let mut framed = framing::framed(stream);

    while let Some(req_env) = framing::read_request(&mut framed).await? {
        let req_id = req_env.id;
        let is_shutdown = matches!(req_env.payload, Request::Shutdown {});

        let payload = match handle(&daemon, req_env.payload).await {
            Ok(resp) => resp,
            Err(err) => Response::Error(err),
        };
        framing::send_response(&mut framed, &Envelope { id: req_id, payload }).await?;

        if is_shutdown {
            info!("shutdown requested over control socket");
            daemon.shutdown.cancel();
            break;
        }
    }
    Ok(())
}

async fn handle(daemon: &Arc<Daemon>, request: Request) -> Result<Response, RpcError> {
    let fleet = daemon.fleet();
    match request {
        Request::Ping { protocol_version, client_version } => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(RpcError {
                    code: ErrorCode::UnsupportedProtocol,
                    message: format!(
                        "client {client_version} speaks protocol {protocol_version}, daemon speaks {PROTOCOL_VERSION}"
                    ),
                    details: Default::default(),
                });
            }
            Ok(Response::Pong {
                daemon_version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: PROTOCOL_VERSION,
            })
        }

        Request::Status {} => Ok(Response::Status {
            daemon: DaemonStatus {
                daemon_version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: PROTOCOL_VERSION,
                pid: std::process::id(),
                uptime_ms: now_millis().saturating_sub(daemon.started_ms),
                running_tasks: daemon.scheduler.running(),
            },
            servers: fleet.summaries(),
        }),

        Request::SyncPlayers { server, wait } => {
            let config = fleet.enabled_server(&server)?.clone();
            if wait {
                let outcome = fleet.sync_players(&config).await?;
                return Ok(Response::PlayersSynced {
                    server,
                    online: outcome.online,
                    joined: outcome.joined,
                    left: outcome.left,
                    disconnected: outcome.disconnected,
                });
            }
            ensure_running(daemon)?;
            let fleet = Arc::clone(fleet);
            daemon.scheduler.spawn_tracked(async move {
                if let Err(err) = fleet.sync_players(&config).await {
                    warn!(server = %config.id, "triggered player sync failed: {err}");
                }
            });
            Ok(Response::Accepted { server, task: TaskKind::PlayerSync })
        }

        Request::SyncSave { server, wait } => {
            let config = fleet.enabled_server(&server)?.clone();
            if wait {
                fleet.sync_save(&config).await?;
                return Ok(Response::SaveSynced { server });
            }
            ensure_running(daemon)?;
            let fleet = Arc::clone(fleet);
            daemon.scheduler.spawn_tracked(async move {
                if let Err(err) = fleet.sync_save(&config).await {
                    warn!(server = %config.id, "triggered save sync failed: {err}");
                }
            });
            Ok(Response::Accepted { server, task: TaskKind::SaveSync })
        }

        Request::BackupNow { server } => {
            let config = fleet.enabled_server(&server)?.clone();
            let (record, _retention) = fleet.backup(&config).await?;
            Ok(Response::BackupCreated { record })
        }

        Request::ListBackups { server, start_ms, end_ms } => {
            fleet.server(&server)?;
            let start = start_ms.map(millis_to_utc).transpose()?;
            let end = end_ms.map(millis_to_utc).transpose()?;
            let records = fleet.backups().list(&server, start, end)?;
            Ok(Response::Backups { records })
        }

        Request::GetBackup { server, backup_id } => {
            fleet.server(&server)?;
            let (record, path) = fleet.backups().get(&server, &backup_id)?;
            Ok(Response::Backup {
                record,
                archive_path: path.display().to_string(),
            })
        }

        Request::DeleteBackup { server, backup_id } => {
            fleet.server(&server)?;
            fleet.backups().delete(&server, &backup_id)?;
            Ok(Response::BackupDeleted { backup_id })
        }

        Request::ListOnlinePlayers { server } => Ok(Response::OnlinePlayers {
            players: fleet.online_players(&server)?,
        }),

        Request::ListWhitelist { server } => {
            fleet.server(&server)?;
            Ok(Response::Whitelist {
                entries: whitelist::list(fleet.store(), &server)?,
            })
        }

        Request::AddWhitelist { server, entry } => {
            fleet.server(&server)?;
            whitelist::add(fleet.store(), &server, entry)?;
            Ok(Response::WhitelistUpdated {})
        }

        Request::RemoveWhitelist { server, identifier } => {
            fleet.server(&server)?;
            whitelist::remove(fleet.store(), &server, &identifier)?;
            Ok(Response::WhitelistUpdated {})
        }

        Request::PutWhitelist { server, entries } => {
            fleet.server(&server)?;
            whitelist::replace(fleet.store(), &server, entries)?;
            Ok(Response::WhitelistUpdated {})
        }

        Request::Shutdown {} => Ok(Response::ShutdownAck {}),
    }
}

fn ensure_running(daemon: &Daemon) -> Result<(), RpcError> {
    if daemon.scheduler.is_shutting_down() {
        error!("rejecting background job, daemon is shutting down");
        return Err(RpcError {
            code: ErrorCode::Internal,
            message: "daemon is shutting down".into(),
            details: Default::default(),
        });
    }
    Ok(())
}

fn millis_to_utc(ms: UnixMillis) -> Result<DateTime<Utc>, FleetError> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| FleetError::InvalidRequest(format!("timestamp {ms} is out of range")))
}
