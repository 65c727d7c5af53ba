//! Join/leave detection between polls and the broadcasts that announce them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use fleet_core::model::OnlinePlayer;

use crate::client::GameClient;
use crate::config::TaskConfig;

/// Player uid to display name at one poll instant.
pub type Snapshot = BTreeMap<String, String>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresenceDiff {
    pub joined: Vec<(String, String)>,
    pub left: Vec<(String, String)>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

#[derive(Debug, Default)]
struct PresenceEntry {
    ever_polled: bool,
    last: Snapshot,
}

/// Remembers each server's previous snapshot for the lifetime of the process.
///
/// The outer map is only held long enough to fetch a server's slot; each slot has its own
/// async lock so observing one server never waits on another.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    servers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<PresenceEntry>>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the server's slot. Holding it serializes everything done for one server
    /// between polling and persisting, so snapshots are stored in the order they were taken.
    pub async fn lock(&self, server_id: &str) -> PresenceSlot {
        let entry = self.slot(server_id).lock_owned().await;
        PresenceSlot {
            server_id: server_id.to_string(),
            entry,
        }
    }

    fn slot(&self, server_id: &str) -> Arc<tokio::sync::Mutex<PresenceEntry>> {
        let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(servers.entry(server_id.to_string()).or_default())
    }
}

/// Exclusive access to one server's presence state.
pub struct PresenceSlot {
    server_id: String,
    entry: tokio::sync::OwnedMutexGuard<PresenceEntry>,
}

impl PresenceSlot {
    /// Records `current` as the server's latest snapshot and reports what changed since the
    /// previous one. The first observation of a server only records.
    pub fn observe(&mut self, current: Snapshot) -> PresenceDiff {
        if !self.entry.ever_polled {
            self.entry.ever_polled = true;
            self.entry.last = current;
            debug!(server = %self.server_id, "first presence poll, notifications suppressed");
            return PresenceDiff::default();
        }

        let changes = diff(&self.entry.last, &current);
        self.entry.last = current;
        changes
    }
}

pub fn snapshot_of(players: &[OnlinePlayer]) -> Snapshot {
    players
        .iter()
        .filter(|player| !player.player_uid.is_empty())
        .map(|player| (player.player_uid.clone(), player.nickname.clone()))
        .collect()
}

pub fn diff(last: &Snapshot, current: &Snapshot) -> PresenceDiff {
    let joined = current
        .iter()
        .filter(|(id, _)| !last.contains_key(*id))
        .map(|(id, name)| (id.clone(), name.clone()))
        .collect();
    let left = last
        .iter()
        .filter(|(id, _)| !current.contains_key(*id))
        .map(|(id, name)| (id.clone(), name.clone()))
        .collect();
    PresenceDiff { joined, left }
}

/// Fills `{username}`, `{online_num}` and `{server_name}`.
pub fn render(template: &str, username: &str, online: usize, server_name: &str) -> String {
    template
        .replace("{username}", username)
        .replace("{online_num}", &online.to_string())
        .replace("{server_name}", server_name)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    login_template: String,
    logout_template: String,
    line_delay: Duration,
}

impl Notifier {
    pub fn new(login_template: impl Into<String>, logout_template: impl Into<String>, line_delay: Duration) -> Self {
        Self {
            login_template: login_template.into(),
            logout_template: logout_template.into(),
            line_delay,
        }
    }

    pub fn from_config(task: &TaskConfig) -> Self {
        Self::new(
            task.player_login_message.clone(),
            task.player_logout_message.clone(),
            task.broadcast_delay(),
        )
    }

    /// Sends every join message, then every leave message. Lines are sent one at a time with
    /// `line_delay` between them; a failed line is logged and skipped.
    pub async fn announce(
        &self,
        client: &dyn GameClient,
        server_id: &str,
        server_name: &str,
        online: usize,
        changes: &PresenceDiff,
    ) -> NotifyReport {
        let messages = changes
            .joined
            .iter()
            .map(|(_, name)| render(&self.login_template, name, online, server_name))
            .chain(
                changes
                    .left
                    .iter()
                    .map(|(_, name)| render(&self.logout_template, name, online, server_name)),
            );

        let mut report = NotifyReport::default();
        let mut first = true;
        for message in messages {
            for line in message.lines().filter(|line| !line.trim().is_empty()) {
                if !first && !self.line_delay.is_zero() {
                    tokio::time::sleep(self.line_delay).await;
                }
                first = false;
                match client.broadcast(line).await {
                    Ok(()) => report.sent += 1,
                    Err(err) => {
                        warn!(server = %server_id, "broadcast failed: {err}");
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }
}
