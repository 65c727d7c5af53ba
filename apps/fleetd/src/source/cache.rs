//! Eviction of leftover resolver scratch directories.
//!
//! A resolved source removes its own directory when dropped, so entries only pile up when the
//! process dies mid-resolution. Eviction keeps the newest `max_entries`, drops anything older
//! than `max_age`, and never touches entries younger than `min_age` (they may still be in use).

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Shared prefix of every scratch directory the resolver creates.
pub const TEMP_PREFIX: &str = "fleetsav-";

#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    pub max_entries: usize,
    pub max_age: Duration,
    pub min_age: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    pub kept: usize,
    pub removed: Vec<PathBuf>,
}

pub fn evict(root: &Path, policy: EvictionPolicy, now: SystemTime) -> std::io::Result<EvictionReport> {
    let mut entries = Vec::new();
    let read_dir = match std::fs::read_dir(root) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(EvictionReport::default()),
        Err(err) => return Err(err),
    };
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(now);
        entries.push((entry.path(), now.duration_since(modified).unwrap_or_default()));
    }

    // Newest first.
    entries.sort_by_key(|(_, age)| *age);

    let mut report = EvictionReport::default();
    for (index, (path, age)) in entries.into_iter().enumerate() {
        let too_many = index >= policy.max_entries;
        let too_old = age > policy.max_age;
        if age < policy.min_age || !(too_many || too_old) {
            report.kept += 1;
            continue;
        }
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "evicted scratch entry");
                report.removed.push(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), "failed to evict scratch entry: {err}");
                report.kept += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::unique_temp_dir;

    fn policy(max_entries: usize, max_age_secs: u64, min_age_secs: u64) -> EvictionPolicy {
        EvictionPolicy {
            max_entries,
            max_age: Duration::from_secs(max_age_secs),
            min_age: Duration::from_secs(min_age_secs),
        }
    }

    fn make_entries(root: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = root.join(format!("{TEMP_PREFIX}decode-{i}"));
                std::fs::create_dir_all(&path).expect("create entry");
                std::fs::write(path.join("Level.sav"), b"x").expect("write entry");
                path
            })
            .collect()
    }

    #[test]
    fn count_bound_removes_the_oldest_entries() {
        let root = unique_temp_dir("cache-count");
        std::fs::create_dir_all(&root).expect("create root");
        make_entries(&root, 4);
        std::fs::create_dir_all(root.join("unrelated")).expect("create unrelated");

        // Evaluated an hour later so every entry is past the in-use guard.
        let later = SystemTime::now() + Duration::from_secs(3600);
        let report = evict(&root, policy(2, 86_400, 60), later).expect("evict");

        assert_eq!(report.kept, 2);
        assert_eq!(report.removed.len(), 2);
        assert!(root.join("unrelated").exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn age_bound_removes_everything_stale() {
        let root = unique_temp_dir("cache-age");
        std::fs::create_dir_all(&root).expect("create root");
        let entries = make_entries(&root, 3);

        let later = SystemTime::now() + Duration::from_secs(7200);
        let report = evict(&root, policy(5, 3600, 60), later).expect("evict");

        assert_eq!(report.kept, 0);
        assert!(entries.iter().all(|path| !path.exists()));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn fresh_entries_survive_even_over_the_count_bound() {
        let root = unique_temp_dir("cache-fresh");
        std::fs::create_dir_all(&root).expect("create root");
        let entries = make_entries(&root, 3);

        let report = evict(&root, policy(1, 3600, 600), SystemTime::now()).expect("evict");

        assert_eq!(report.kept, 3);
        assert!(entries.iter().all(|path| path.exists()));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn missing_root_is_not_an_error() {
        let root = unique_temp_dir("cache-missing");
        let report = evict(&root, policy(5, 3600, 60), SystemTime::now()).expect("evict");
        assert_eq!(report, EvictionReport::default());
    }
}
