use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use fleet_core::model::BackupRecord;
use fleet_core::proto::{Request, Response, UnixMillis};

use crate::client::{request, unexpected};

pub async fn backup_now(server: String) -> Result<String> {
    match request(Request::BackupNow { server }).await? {
        Response::BackupCreated { record } => Ok(format!("created {}", render_record(&record))),
        other => Err(unexpected(other)),
    }
}

pub async fn backup_list(server: String, since: Option<String>, until: Option<String>) -> Result<String> {
    let start_ms = since.as_deref().map(parse_bound).transpose()?;
    let end_ms = until.as_deref().map(parse_bound).transpose()?;
    match request(Request::ListBackups { server, start_ms, end_ms }).await? {
        Response::Backups { records } if records.is_empty() => Ok("no backups".to_string()),
        Response::Backups { records } => Ok(records
            .iter()
            .map(render_record)
            .collect::<Vec<_>>()
            .join("\n")),
        other => Err(unexpected(other)),
    }
}

pub async fn backup_show(server: String, backup_id: String) -> Result<String> {
    match request(Request::GetBackup { server, backup_id }).await? {
        Response::Backup { record, archive_path } => {
            Ok(format!("{}\narchive: {archive_path}", render_record(&record)))
        }
        other => Err(unexpected(other)),
    }
}

pub async fn backup_delete(server: String, backup_id: String) -> Result<String> {
    match request(Request::DeleteBackup { server, backup_id }).await? {
        Response::BackupDeleted { backup_id } => Ok(format!("deleted {backup_id}")),
        other => Err(unexpected(other)),
    }
}

fn render_record(record: &BackupRecord) -> String {
    format!(
        "{}  {}  {}",
        record.backup_id,
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.path
    )
}

/// Accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
fn parse_bound(raw: &str) -> Result<UnixMillis> {
    let at = match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("`{raw}` is neither RFC 3339 nor YYYY-MM-DD"))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("`{raw}` has no midnight"))?
            .and_utc(),
    };
    u64::try_from(at.timestamp_millis()).map_err(|_| anyhow::anyhow!("`{raw}` is before 1970"))
}
