use tracing::{error, info, warn};

use fleet_core::FleetError;
use fleet_core::proto::TaskKind;

use crate::fleet::Fleet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs one pass of `kind` over every enabled server, one server at a time. A server's
/// failure is logged and never stops the pass.
pub async fn run(fleet: &Fleet, kind: TaskKind) -> PassReport {
    info!(task = kind.as_str(), "pass started");
    let report = match kind {
        TaskKind::PlayerSync => player_sync(fleet).await,
        TaskKind::SaveSync => save_sync(fleet).await,
        TaskKind::Backup => backup(fleet).await,
        TaskKind::CacheEviction => cache_eviction(fleet).await,
    };
    info!(
        task = kind.as_str(),
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "pass finished"
    );
    report
}

async fn player_sync(fleet: &Fleet) -> PassReport {
    let mut report = PassReport::default();
    for server in fleet.enabled_servers() {
        match fleet.sync_players(server).await {
            Ok(outcome) => {
                info!(
                    server = %server.id,
                    online = outcome.online,
                    joined = outcome.joined,
                    left = outcome.left,
                    "player sync done"
                );
                report.succeeded += 1;
            }
            Err(err) => {
                error!(server = %server.id, "player sync failed: {err}");
                report.failed += 1;
            }
        }
    }
    report
}

async fn save_sync(fleet: &Fleet) -> PassReport {
    let mut report = PassReport::default();
    for server in fleet.enabled_servers() {
        if server.origin().is_none() {
            warn!(server = %server.id, "no save path configured, skipping save sync");
            report.skipped += 1;
            continue;
        }
        match fleet.sync_save(server).await {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                error!(server = %server.id, "save sync failed: {err}");
                report.failed += 1;
            }
        }
    }
    report
}

async fn backup(fleet: &Fleet) -> PassReport {
    let mut report = PassReport::default();
    for server in fleet.enabled_servers() {
        match fleet.backup(server).await {
            Ok((record, retention)) => {
                info!(server = %server.id, backup_id = %record.backup_id, "backup done");
                if !retention.deleted.is_empty() || !retention.failed.is_empty() {
                    info!(
                        server = %server.id,
                        expired = retention.deleted.len(),
                        failed = retention.failed.len(),
                        "retention applied"
                    );
                }
                report.succeeded += 1;
            }
            Err(FleetError::Configuration(msg)) => {
                warn!(server = %server.id, "skipping backup: {msg}");
                report.skipped += 1;
            }
            Err(err) => {
                error!(server = %server.id, "backup failed, keeping existing backups: {err}");
                report.failed += 1;
            }
        }
    }
    report
}

async fn cache_eviction(fleet: &Fleet) -> PassReport {
    match fleet.evict_cache().await {
        Ok(evicted) => {
            if !evicted.removed.is_empty() {
                info!(removed = evicted.removed.len(), kept = evicted.kept, "scratch cache trimmed");
            }
            PassReport { succeeded: 1, ..PassReport::default() }
        }
        Err(err) => {
            error!("cache eviction failed: {err}");
            PassReport { failed: 1, ..PassReport::default() }
        }
    }
}
