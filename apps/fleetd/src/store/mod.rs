//! Per-server namespaced key-value store.
//!
//! Every record lives under `{server_id}_{entity_id}` in one of the buckets below; values are
//! JSON. Server ids never contain `_` (enforced at config load), so a prefix scan over
//! `{server_id}_` yields exactly that server's records.

mod tables;

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

use fleet_core::FleetError;

pub use tables::Bucket;

pub struct NamespacedStore {
    db: Database,
}

pub fn key(server_id: &str, entity_id: &str) -> String {
    format!("{server_id}_{entity_id}")
}

fn prefix(server_id: &str) -> String {
    format!("{server_id}_")
}

impl NamespacedStore {
    /// Opens (or creates) the database and makes sure every bucket exists.
    pub fn open(path: &Path) -> Result<Self, FleetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| FleetError::io("creating store directory", err))?;
        }
        let db = Database::create(path).map_err(FleetError::storage)?;

        let txn = db.begin_write().map_err(FleetError::storage)?;
        for bucket in Bucket::ALL {
            txn.open_table(bucket.table()).map_err(FleetError::storage)?;
        }
        txn.commit().map_err(FleetError::storage)?;

        Ok(Self { db })
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        bucket: Bucket,
        server_id: &str,
        entity_id: &str,
    ) -> Result<T, FleetError> {
        let txn = self.db.begin_read().map_err(FleetError::storage)?;
        let table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
        let k = key(server_id, entity_id);
        let Some(value) = table.get(k.as_str()).map_err(FleetError::storage)? else {
            return Err(FleetError::NotFound(format!("{} record {k}", bucket.name())));
        };
        decode(bucket, value.value())
    }

    pub fn put<T: Serialize>(
        &self,
        bucket: Bucket,
        server_id: &str,
        entity_id: &str,
        record: &T,
    ) -> Result<(), FleetError> {
        let bytes = encode(record)?;
        let txn = self.db.begin_write().map_err(FleetError::storage)?;
        {
            let mut table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
            table
                .insert(key(server_id, entity_id).as_str(), bytes.as_slice())
                .map_err(FleetError::storage)?;
        }
        txn.commit().map_err(FleetError::storage)
    }

    /// Deleting a missing key is not an error.
    pub fn delete(&self, bucket: Bucket, server_id: &str, entity_id: &str) -> Result<(), FleetError> {
        let txn = self.db.begin_write().map_err(FleetError::storage)?;
        {
            let mut table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
            table
                .remove(key(server_id, entity_id).as_str())
                .map_err(FleetError::storage)?;
        }
        txn.commit().map_err(FleetError::storage)
    }

    pub fn list_by_server<T: DeserializeOwned>(
        &self,
        bucket: Bucket,
        server_id: &str,
    ) -> Result<Vec<T>, FleetError> {
        let txn = self.db.begin_read().map_err(FleetError::storage)?;
        let table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
        let prefix = prefix(server_id);

        let mut out = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(FleetError::storage)? {
            let (k, v) = entry.map_err(FleetError::storage)?;
            if !k.value().starts_with(&prefix) {
                break;
            }
            out.push(decode(bucket, v.value())?);
        }
        Ok(out)
    }

    pub fn count_by_server(&self, bucket: Bucket, server_id: &str) -> Result<usize, FleetError> {
        let txn = self.db.begin_read().map_err(FleetError::storage)?;
        let table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
        let prefix = prefix(server_id);

        let mut count = 0;
        for entry in table.range(prefix.as_str()..).map_err(FleetError::storage)? {
            let (k, _) = entry.map_err(FleetError::storage)?;
            if !k.value().starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Swaps the server's whole key range for `records` in a single write transaction.
    /// Readers see either the previous set or the new one.
    pub fn replace_all_for_server<T: Serialize>(
        &self,
        bucket: Bucket,
        server_id: &str,
        records: &[(String, T)],
    ) -> Result<(), FleetError> {
        let encoded = records
            .iter()
            .map(|(entity_id, record)| Ok((key(server_id, entity_id), encode(record)?)))
            .collect::<Result<Vec<_>, FleetError>>()?;

        let txn = self.db.begin_write().map_err(FleetError::storage)?;
        {
            let mut table = txn.open_table(bucket.table()).map_err(FleetError::storage)?;
            let prefix = prefix(server_id);

            let mut stale = Vec::new();
            for entry in table.range(prefix.as_str()..).map_err(FleetError::storage)? {
                let (k, _) = entry.map_err(FleetError::storage)?;
                let k = k.value();
                if !k.starts_with(&prefix) {
                    break;
                }
                stale.push(k.to_string());
            }
            for k in &stale {
                table.remove(k.as_str()).map_err(FleetError::storage)?;
            }
            for (k, bytes) in &encoded {
                table
                    .insert(k.as_str(), bytes.as_slice())
                    .map_err(FleetError::storage)?;
            }
        }
        txn.commit().map_err(FleetError::storage)
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, FleetError> {
    serde_json::to_vec(record).map_err(FleetError::storage)
}

fn decode<T: DeserializeOwned>(bucket: Bucket, bytes: &[u8]) -> Result<T, FleetError> {
    serde_json::from_slice(bytes)
        .map_err(|err| FleetError::Storage(format!("corrupt {} record: {err}", bucket.name())))
}

impl Bucket {
    fn table(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Bucket::OnlinePlayers => tables::ONLINE_PLAYERS,
            Bucket::Whitelist => tables::WHITELIST,
            Bucket::Backups => tables::BACKUPS,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("fleetd-{prefix}-{nanos}"))
    }

    pub(crate) fn open_temp_store(prefix: &str) -> (NamespacedStore, PathBuf) {
        let dir = unique_temp_dir(prefix);
        let store = NamespacedStore::open(&dir.join("fleet.redb")).expect("open store");
        (store, dir)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        server_id: String,
        text: String,
    }

    fn note(server_id: &str, text: &str) -> Note {
        Note { server_id: server_id.into(), text: text.into() }
    }

    #[test]
    fn get_put_delete_round_trip() {
        let (store, dir) = open_temp_store("store-crud");

        store.put(Bucket::Whitelist, "srv1", "p1", &note("srv1", "a")).expect("put");
        let got: Note = store.get(Bucket::Whitelist, "srv1", "p1").expect("get");
        assert_eq!(got.text, "a");

        store.delete(Bucket::Whitelist, "srv1", "p1").expect("delete");
        let err = store.get::<Note>(Bucket::Whitelist, "srv1", "p1").unwrap_err();
        assert!(err.is_not_found());
        store.delete(Bucket::Whitelist, "srv1", "p1").expect("deleting twice is fine");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn list_by_server_never_leaks_neighbouring_servers() {
        let (store, dir) = open_temp_store("store-scan");

        // `srv1` sorts right before `srv10`; the `_` separator keeps them apart.
        store.put(Bucket::Backups, "srv1", "a", &note("srv1", "a")).expect("put");
        store.put(Bucket::Backups, "srv1", "b", &note("srv1", "b")).expect("put");
        store.put(Bucket::Backups, "srv10", "a", &note("srv10", "x")).expect("put");
        store.put(Bucket::Backups, "srv0", "z", &note("srv0", "y")).expect("put");

        let notes: Vec<Note> = store.list_by_server(Bucket::Backups, "srv1").expect("list");
        assert_eq!(notes, vec![note("srv1", "a"), note("srv1", "b")]);
        assert_eq!(store.count_by_server(Bucket::Backups, "srv10").expect("count"), 1);
        assert!(store
            .list_by_server::<Note>(Bucket::Whitelist, "srv1")
            .expect("other bucket")
            .is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn replace_all_for_server_swaps_only_that_server() {
        let (store, dir) = open_temp_store("store-replace");

        store
            .replace_all_for_server(
                Bucket::OnlinePlayers,
                "srv1",
                &[("p1".to_string(), note("srv1", "old1")), ("p2".to_string(), note("srv1", "old2"))],
            )
            .expect("first replace");
        store.put(Bucket::OnlinePlayers, "srv2", "p1", &note("srv2", "keep")).expect("put");

        store
            .replace_all_for_server(Bucket::OnlinePlayers, "srv1", &[("p3".to_string(), note("srv1", "new"))])
            .expect("second replace");

        let srv1: Vec<Note> = store.list_by_server(Bucket::OnlinePlayers, "srv1").expect("list");
        assert_eq!(srv1, vec![note("srv1", "new")]);
        let srv2: Vec<Note> = store.list_by_server(Bucket::OnlinePlayers, "srv2").expect("list");
        assert_eq!(srv2, vec![note("srv2", "keep")]);

        store
            .replace_all_for_server::<Note>(Bucket::OnlinePlayers, "srv1", &[])
            .expect("clear");
        assert_eq!(store.count_by_server(Bucket::OnlinePlayers, "srv1").expect("count"), 0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn concurrent_readers_never_observe_a_partial_replacement() {
        let (store, dir) = open_temp_store("store-atomic");
        let store = Arc::new(store);

        let set = |tag: &str| -> Vec<(String, Note)> {
            (0..20)
                .map(|i| (format!("p{i:02}"), note("srv1", tag)))
                .collect()
        };
        store
            .replace_all_for_server(Bucket::OnlinePlayers, "srv1", &set("a"))
            .expect("seed");

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for round in 0..50 {
                    let tag = if round % 2 == 0 { "b" } else { "a" };
                    store
                        .replace_all_for_server(Bucket::OnlinePlayers, "srv1", &set(tag))
                        .expect("replace");
                }
            })
        };

        for _ in 0..200 {
            let seen: Vec<Note> = store.list_by_server(Bucket::OnlinePlayers, "srv1").expect("list");
            assert_eq!(seen.len(), 20);
            let first = &seen[0].text;
            assert!(seen.iter().all(|n| &n.text == first), "mixed snapshot observed");
        }
        writer.join().expect("writer thread");

        let _ = std::fs::remove_dir_all(dir);
    }
}
