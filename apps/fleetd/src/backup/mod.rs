//! Backup creation, lookup, deletion and retention.
//!
//! An archive lives at `{root}/{server_id}/{file}` and its record in the `backups` bucket
//! stores `file` relative to the server directory. A record exists exactly when its archive
//! does, with one tolerated exception: if persisting the record fails after the archive was
//! written, the archive is logged as an orphan and left in place.

mod archive;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use fleet_core::FleetError;
use fleet_core::model::BackupRecord;

use crate::config::ServerConfig;
use crate::source::{Origin, Purpose, SourceResolver};
use crate::store::{Bucket, NamespacedStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Backup ids whose archive and record were both removed.
    pub deleted: Vec<String>,
    /// Backup ids where at least one of the two deletions failed.
    pub failed: Vec<String>,
}

pub struct BackupManager {
    store: Arc<NamespacedStore>,
    resolver: Arc<SourceResolver>,
    root: PathBuf,
}

impl BackupManager {
    pub fn new(store: Arc<NamespacedStore>, resolver: Arc<SourceResolver>, root: PathBuf) -> Self {
        Self { store, resolver, root }
    }

    pub fn server_dir(&self, server_id: &str) -> PathBuf {
        self.root.join(server_id)
    }

    pub fn archive_path(&self, record: &BackupRecord) -> PathBuf {
        self.server_dir(&record.server_id).join(&record.path)
    }

    pub async fn create_backup(&self, server: &ServerConfig) -> Result<BackupRecord, FleetError> {
        let raw = server.origin().ok_or_else(|| {
            FleetError::Configuration(format!("server `{}` has no save path", server.id))
        })?;
        let origin = Origin::parse(raw)?;
        let resolved = self.resolver.resolve(&origin, Purpose::Backup).await?;

        let dir = self.server_dir(&server.id);
        std::fs::create_dir_all(&dir).map_err(|err| FleetError::io("creating backup directory", err))?;
        let created_at = Utc::now();
        let file_name = unique_archive_name(&dir, &server.id, created_at);
        let target = dir.join(&file_name);

        // The resolved copy moves into the blocking task so it outlives the zip writer.
        let zip_target = target.clone();
        tokio::task::spawn_blocking(move || {
            let result = archive::zip_dir(resolved.path(), &zip_target);
            drop(resolved);
            result
        })
        .await
        .map_err(|err| FleetError::Storage(format!("backup task failed: {err}")))??;

        let record = BackupRecord {
            server_id: server.id.clone(),
            backup_id: Uuid::new_v4().to_string(),
            created_at,
            path: file_name,
        };
        if let Err(err) = self
            .store
            .put(Bucket::Backups, &record.server_id, &record.backup_id, &record)
        {
            error!(
                server = %server.id,
                orphan = %target.display(),
                "backup archive written but its record could not be saved: {err}"
            );
            return Err(err);
        }

        info!(server = %server.id, backup_id = %record.backup_id, path = %target.display(), "backup created");
        Ok(record)
    }

    pub fn enforce_retention(&self, server_id: &str, keep_days: u32) -> RetentionReport {
        self.enforce_retention_at(server_id, keep_days, Utc::now())
    }

    /// Deletes every backup created before `now - keep_days`. Both the archive and the record
    /// deletion are attempted for each expired backup; failures are logged and the sweep goes on.
    pub fn enforce_retention_at(&self, server_id: &str, keep_days: u32, now: DateTime<Utc>) -> RetentionReport {
        let mut report = RetentionReport::default();
        let cutoff = now - ChronoDuration::days(i64::from(keep_days));

        let records: Vec<BackupRecord> = match self.store.list_by_server(Bucket::Backups, server_id) {
            Ok(records) => records,
            Err(err) => {
                error!(server = %server_id, "failed to list backups for retention: {err}");
                return report;
            }
        };

        for record in records.into_iter().filter(|record| record.created_at < cutoff) {
            let mut ok = true;
            let path = self.archive_path(&record);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(server = %server_id, path = %path.display(), "failed to delete expired archive: {err}");
                    ok = false;
                }
            }
            if let Err(err) = self.store.delete(Bucket::Backups, server_id, &record.backup_id) {
                warn!(server = %server_id, backup_id = %record.backup_id, "failed to delete expired record: {err}");
                ok = false;
            }

            if ok {
                info!(server = %server_id, backup_id = %record.backup_id, "expired backup removed");
                report.deleted.push(record.backup_id);
            } else {
                report.failed.push(record.backup_id);
            }
        }
        report
    }

    /// Records created within `[start, end]`, newest first.
    pub fn list(
        &self,
        server_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<BackupRecord>, FleetError> {
        let mut records: Vec<BackupRecord> = self.store.list_by_server(Bucket::Backups, server_id)?;
        records.retain(|record| {
            start.is_none_or(|start| record.created_at >= start) && end.is_none_or(|end| record.created_at <= end)
        });
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn get(&self, server_id: &str, backup_id: &str) -> Result<(BackupRecord, PathBuf), FleetError> {
        let record: BackupRecord = self.store.get(Bucket::Backups, server_id, backup_id)?;
        let path = self.archive_path(&record);
        Ok((record, path))
    }

    /// Removes the archive, then the record. A missing archive is fine; any other file error
    /// aborts and leaves the record in place.
    pub fn delete(&self, server_id: &str, backup_id: &str) -> Result<(), FleetError> {
        let (_, path) = self.get(server_id, backup_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(server = %server_id, path = %path.display(), "archive already gone, removing record");
            }
            Err(err) => return Err(FleetError::io("deleting backup archive", err)),
        }
        self.store.delete(Bucket::Backups, server_id, backup_id)?;
        info!(server = %server_id, backup_id, "backup deleted");
        Ok(())
    }
}

fn unique_archive_name(dir: &Path, server_id: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y-%m-%d-%H-%M-%S");
    let base = format!("{server_id}_{stamp}");
    let mut name = format!("{base}.zip");
    let mut n = 1;
    while dir.join(&name).exists() {
        name = format!("{base}-{n}.zip");
        n += 1;
    }
    name
}
