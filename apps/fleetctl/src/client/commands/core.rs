use fleet_core::PROTOCOL_VERSION;
use fleet_core::proto::{DaemonStatus, Request, Response, ServerSummary};

use crate::client::{request, unexpected};

pub async fn ping() -> anyhow::Result<String> {
    let resp = request(Request::Ping {
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION,
    })
    .await?;

    match resp {
        Response::Pong { daemon_version, protocol_version } => {
            Ok(format!("pong: daemon={daemon_version} protocol={protocol_version}"))
        }
        other => Err(unexpected(other)),
    }
}

pub async fn status() -> anyhow::Result<String> {
    match request(Request::Status {}).await? {
        Response::Status { daemon, servers } => Ok(render_status(&daemon, &servers)),
        other => Err(unexpected(other)),
    }
}

pub async fn shutdown() -> anyhow::Result<String> {
    match request(Request::Shutdown {}).await? {
        Response::ShutdownAck {} => Ok("Daemon acknowledged shutdown request.".to_string()),
        other => Err(unexpected(other)),
    }
}

fn render_status(daemon: &DaemonStatus, servers: &[ServerSummary]) -> String {
    let running = if daemon.running_tasks.is_empty() {
        "idle".to_string()
    } else {
        daemon
            .running_tasks
            .iter()
            .map(|task| task.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut out = format!(
        "fleetd {} (pid {}, up {}s, protocol {})\nrunning: {running}\n",
        daemon.daemon_version,
        daemon.pid,
        daemon.uptime_ms / 1000,
        daemon.protocol_version,
    );
    for server in servers {
        out.push_str(&format!(
            "  {:<12} {:<24} {:<8} online={:<3} backups={}\n",
            server.id,
            server.name,
            if server.enabled { "enabled" } else { "disabled" },
            server.online_players,
            server.backups,
        ));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::proto::TaskKind;

    #[test]
    fn status_lists_tasks_and_servers() {
        let daemon = DaemonStatus {
            daemon_version: "0.1.0".into(),
            protocol_version: 1,
            pid: 42,
            uptime_ms: 61_000,
            running_tasks: vec![TaskKind::Backup],
        };
        let servers = vec![ServerSummary {
            id: "srv1".into(),
            name: "Main".into(),
            enabled: true,
            online_players: 3,
            backups: 2,
        }];

        let text = render_status(&daemon, &servers);
        assert!(text.starts_with("fleetd 0.1.0 (pid 42, up 61s, protocol 1)"));
        assert!(text.contains("running: backup"));
        assert!(text.contains("srv1"));
        assert!(text.contains("online=3"));
    }
}
