//! The per-server operations every pass and every trigger-now request goes through.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use fleet_core::FleetError;
use fleet_core::model::{BackupRecord, OnlinePlayer};
use fleet_core::proto::ServerSummary;

use crate::backup::{BackupManager, RetentionReport};
use crate::client::ClientFactory;
use crate::config::{FleetConfig, ServerConfig};
use crate::decode::SaveDecoder;
use crate::presence::{self, Notifier, PresenceTracker};
use crate::source::cache::{self, EvictionPolicy, EvictionReport};
use crate::source::{Origin, Purpose, SourceResolver};
use crate::store::{Bucket, NamespacedStore};
use crate::whitelist;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSyncOutcome {
    pub online: usize,
    pub joined: usize,
    pub left: usize,
    pub disconnected: usize,
}

pub struct Fleet {
    config: Arc<FleetConfig>,
    store: Arc<NamespacedStore>,
    resolver: Arc<SourceResolver>,
    backups: BackupManager,
    presence: PresenceTracker,
    notifier: Notifier,
    clients: Arc<dyn ClientFactory>,
    decoder: Arc<dyn SaveDecoder>,
}

impl Fleet {
    pub fn new(
        config: Arc<FleetConfig>,
        store: Arc<NamespacedStore>,
        resolver: Arc<SourceResolver>,
        clients: Arc<dyn ClientFactory>,
        decoder: Arc<dyn SaveDecoder>,
    ) -> Result<Self, FleetError> {
        let backup_root = config.storage.resolved_backup_dir()?;
        let backups = BackupManager::new(Arc::clone(&store), Arc::clone(&resolver), backup_root);
        let notifier = Notifier::from_config(&config.task);
        Ok(Self {
            config,
            store,
            resolver,
            backups,
            presence: PresenceTracker::new(),
            notifier,
            clients,
            decoder,
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn store(&self) -> &NamespacedStore {
        &self.store
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.config.enabled_servers()
    }

    /// Any configured server, enabled or not.
    pub fn server(&self, id: &str) -> Result<&ServerConfig, FleetError> {
        self.config
            .server(id)
            .ok_or_else(|| FleetError::NotFound(format!("server `{id}`")))
    }

    /// A configured server that is also enabled; the gate for every trigger-now operation.
    pub fn enabled_server(&self, id: &str) -> Result<&ServerConfig, FleetError> {
        let server = self.server(id)?;
        if !server.enabled {
            return Err(FleetError::ServerDisabled(id.to_string()));
        }
        Ok(server)
    }

    /// Poll, diff against the previous poll, announce, enforce, then persist the snapshot.
    pub async fn sync_players(&self, server: &ServerConfig) -> Result<PlayerSyncOutcome, FleetError> {
        let client = self.clients.client_for(server)?;
        // Held until the snapshot is persisted so overlapping syncs of one server cannot
        // store an older poll over a newer one.
        let mut slot = self.presence.lock(&server.id).await;
        let mut players = client.list_online_players().await?;
        for player in &mut players {
            player.server_id = server.id.clone();
        }

        let changes = slot.observe(presence::snapshot_of(&players));
        let mut outcome = PlayerSyncOutcome {
            online: players.len(),
            joined: changes.joined.len(),
            left: changes.left.len(),
            disconnected: 0,
        };

        if self.config.task.player_logging && !changes.is_empty() {
            self.notifier
                .announce(
                    client.as_ref(),
                    &server.id,
                    server.display_name(),
                    players.len(),
                    &changes,
                )
                .await;
        }

        if self.config.manage.kick_non_whitelist {
            let report = whitelist::enforce(&self.store, client.as_ref(), &server.id, &players).await;
            outcome.disconnected = report.disconnected.len();
        }

        let records: Vec<(String, OnlinePlayer)> = players
            .into_iter()
            .filter_map(|player| {
                let entity_id = if player.player_uid.is_empty() {
                    player.steam_id.clone()?
                } else {
                    player.player_uid.clone()
                };
                Some((entity_id, player))
            })
            .collect();
        self.store
            .replace_all_for_server(Bucket::OnlinePlayers, &server.id, &records)?;
        drop(slot);

        debug!(server = %server.id, online = outcome.online, joined = outcome.joined, left = outcome.left, "players synced");
        Ok(outcome)
    }

    pub async fn sync_save(&self, server: &ServerConfig) -> Result<(), FleetError> {
        let raw = server.origin().ok_or_else(|| {
            FleetError::Configuration(format!("server `{}` has no save path", server.id))
        })?;
        let origin = Origin::parse(raw)?;
        let resolved = self.resolver.resolve(&origin, Purpose::Decode).await?;
        self.decoder.decode(server, &resolved).await
    }

    /// Creates a backup and, only once it is recorded, expires old ones. A failed backup
    /// leaves every existing archive in place.
    pub async fn backup(&self, server: &ServerConfig) -> Result<(BackupRecord, RetentionReport), FleetError> {
        let record = self.backups.create_backup(server).await?;
        let keep_days = server.keep_days(self.config.save.backup_keep_days);
        let retention = self.backups.enforce_retention(&server.id, keep_days);
        Ok((record, retention))
    }

    pub async fn evict_cache(&self) -> Result<EvictionReport, FleetError> {
        let root = self.resolver.scratch_root().to_path_buf();
        let policy = EvictionPolicy {
            max_entries: self.config.cache.max_entries,
            max_age: self.config.cache.max_age(),
            min_age: self.config.save.decode_timeout() + Duration::from_secs(60),
        };
        tokio::task::spawn_blocking(move || cache::evict(&root, policy, SystemTime::now()))
            .await
            .map_err(|err| FleetError::Storage(format!("eviction task failed: {err}")))?
            .map_err(|err| FleetError::io("evicting scratch directories", err))
    }

    pub fn online_players(&self, server_id: &str) -> Result<Vec<OnlinePlayer>, FleetError> {
        self.server(server_id)?;
        self.store.list_by_server(Bucket::OnlinePlayers, server_id)
    }

    pub fn summaries(&self) -> Vec<ServerSummary> {
        self.config
            .servers
            .iter()
            .map(|server| {
                let count = |bucket: Bucket| {
                    self.store.count_by_server(bucket, &server.id).unwrap_or_else(|err| {
                        warn!(server = %server.id, "failed to count {}: {err}", bucket.name());
                        0
                    })
                };
                ServerSummary {
                    id: server.id.clone(),
                    name: server.display_name().to_string(),
                    enabled: server.enabled,
                    online_players: count(Bucket::OnlinePlayers),
                    backups: count(Bucket::Backups),
                }
            })
            .collect()
    }

    pub fn log_loaded(&self) {
        let enabled = self.enabled_servers().count();
        info!(servers = self.config.servers.len(), enabled, "fleet loaded");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::GameClient;
    use crate::config::{ServerSaveConfig, StorageConfig};
    use crate::presence::tests::FakeClient;
    use crate::source::ResolvedSource;
    use crate::store::tests::open_temp_store;
    use async_trait::async_trait;
    use fleet_core::model::WhitelistEntry;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Hands out a prepared fake per server id.
    #[derive(Default)]
    pub(crate) struct FakeFactory {
        pub clients: HashMap<String, Arc<FakeClient>>,
    }

    impl ClientFactory for FakeFactory {
        fn client_for(&self, server: &ServerConfig) -> Result<Arc<dyn GameClient>, FleetError> {
            self.clients
                .get(&server.id)
                .map(|client| Arc::clone(client) as Arc<dyn GameClient>)
                .ok_or_else(|| FleetError::Configuration(format!("no client for {}", server.id)))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeDecoder {
        pub decoded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SaveDecoder for FakeDecoder {
        async fn decode(&self, server: &ServerConfig, source: &ResolvedSource) -> Result<(), FleetError> {
            if source.find_file("Level.sav").is_none() {
                return Err(FleetError::SourceUnavailable("no Level.sav".into()));
            }
            self.decoded.lock().unwrap().push(server.id.clone());
            Ok(())
        }
    }

    pub(crate) fn server(id: &str, save_path: Option<PathBuf>) -> ServerConfig {
        ServerConfig {
            id: id.into(),
            name: format!("Server {id}"),
            description: String::new(),
            enabled: true,
            rcon: None,
            rest: None,
            save: ServerSaveConfig {
                path: save_path.map(|path| path.display().to_string()),
                decode_path: None,
                backup_keep_days: None,
            },
        }
    }

    pub(crate) struct Harness {
        pub fleet: Arc<Fleet>,
        pub decoder: Arc<FakeDecoder>,
        pub dir: PathBuf,
    }

    pub(crate) fn harness(
        prefix: &str,
        mut config: FleetConfig,
        clients: HashMap<String, Arc<FakeClient>>,
    ) -> Harness {
        let (store, dir) = open_temp_store(prefix);
        let scratch = dir.join("scratch");
        std::fs::create_dir_all(&scratch).expect("create scratch");
        config.storage = StorageConfig {
            data_dir: Some(dir.clone()),
            backup_dir: Some(dir.join("backups")),
        };
        let resolver = SourceResolver::new(Duration::from_secs(5), Duration::from_secs(5))
            .expect("resolver")
            .with_scratch_root(scratch);
        let decoder = Arc::new(FakeDecoder::default());
        let fleet = Fleet::new(
            Arc::new(config),
            Arc::new(store),
            Arc::new(resolver),
            Arc::new(FakeFactory { clients }),
            Arc::clone(&decoder) as Arc<dyn SaveDecoder>,
        )
        .expect("fleet");
        Harness {
            fleet: Arc::new(fleet),
            decoder,
            dir,
        }
    }

    #[tokio::test]
    async fn sync_players_end_to_end_kicks_only_the_unlisted_player() {
        let mut config = FleetConfig::default();
        config.manage.kick_non_whitelist = true;
        config.servers = vec![server("srv1", None)];
        let client = Arc::new(FakeClient::with_players(vec![
            OnlinePlayer::new("p1", "Alice"),
            OnlinePlayer::new("p2", "Bob").with_steam_id("S2"),
        ]));
        let h = harness(
            "fleet-e2e",
            config,
            HashMap::from([("srv1".to_string(), Arc::clone(&client))]),
        );
        whitelist::add(
            h.fleet.store(),
            "srv1",
            WhitelistEntry {
                server_id: String::new(),
                name: "Alice".into(),
                player_uid: Some("p1".into()),
                steam_id: None,
            },
        )
        .expect("whitelist");

        let srv1 = h.fleet.enabled_server("srv1").expect("srv1").clone();
        let outcome = h.fleet.sync_players(&srv1).await.expect("sync");

        assert_eq!(outcome.disconnected, 1);
        assert_eq!(client.kicked(), vec!["S2"]);
        let stored = h.fleet.online_players("srv1").expect("online");
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|player| player.server_id == "srv1"));
        let _ = std::fs::remove_dir_all(h.dir);
    }

    #[tokio::test]
    async fn announcements_start_from_the_second_poll() {
        let mut config = FleetConfig::default();
        config.task.player_logging = true;
        config.task.broadcast_delay_ms = 0;
        config.task.player_login_message = "+{username}".into();
        config.task.player_logout_message = "-{username}".into();
        config.servers = vec![server("srv1", None)];
        let client = Arc::new(FakeClient::with_players(vec![OnlinePlayer::new("p1", "Alice")]));
        let h = harness(
            "fleet-announce",
            config,
            HashMap::from([("srv1".to_string(), Arc::clone(&client))]),
        );
        let srv1 = h.fleet.enabled_server("srv1").expect("srv1").clone();

        h.fleet.sync_players(&srv1).await.expect("first sync");
        assert!(client.broadcasts().is_empty());

        *client.players.lock().unwrap() = vec![OnlinePlayer::new("p2", "Bob")];
        let outcome = h.fleet.sync_players(&srv1).await.expect("second sync");

        assert_eq!((outcome.joined, outcome.left), (1, 1));
        assert_eq!(client.broadcasts(), vec!["+Bob", "-Alice"]);
        let _ = std::fs::remove_dir_all(h.dir);
    }

    #[tokio::test]
    async fn player_sync_waits_for_the_server_slot() {
        let mut config = FleetConfig::default();
        config.servers = vec![server("srv1", None)];
        let client = Arc::new(FakeClient::with_players(vec![OnlinePlayer::new("p1", "Alice")]));
        let h = harness(
            "fleet-slot",
            config,
            HashMap::from([("srv1".to_string(), client)]),
        );
        let srv1 = h.fleet.enabled_server("srv1").expect("srv1").clone();

        let held = h.fleet.presence.lock("srv1").await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), h.fleet.sync_players(&srv1)).await;
        assert!(blocked.is_err(), "sync ran while another sync held srv1");
        assert!(h.fleet.online_players("srv1").expect("online").is_empty());

        drop(held);
        h.fleet.sync_players(&srv1).await.expect("sync");
        assert_eq!(h.fleet.online_players("srv1").expect("online").len(), 1);
        let _ = std::fs::remove_dir_all(h.dir);
    }

    #[tokio::test]
    async fn server_lookup_distinguishes_missing_and_disabled() {
        let mut config = FleetConfig::default();
        let mut disabled = server("srv2", None);
        disabled.enabled = false;
        config.servers = vec![server("srv1", None), disabled];
        let h = harness("fleet-lookup", config, HashMap::new());

        assert!(h.fleet.enabled_server("srv1").is_ok());
        assert!(matches!(h.fleet.enabled_server("srv2"), Err(FleetError::ServerDisabled(_))));
        assert!(h.fleet.enabled_server("nope").unwrap_err().is_not_found());
        let _ = std::fs::remove_dir_all(h.dir);
    }

    #[tokio::test]
    async fn sync_save_resolves_and_decodes() {
        let mut config = FleetConfig::default();
        let save_dir = crate::store::tests::unique_temp_dir("fleet-save-src");
        std::fs::create_dir_all(&save_dir).expect("create save");
        std::fs::write(save_dir.join("Level.sav"), b"level").expect("write save");
        config.servers = vec![server("srv1", Some(save_dir.clone())), server("srv2", None)];
        let h = harness("fleet-save", config, HashMap::new());

        let srv1 = h.fleet.enabled_server("srv1").expect("srv1").clone();
        h.fleet.sync_save(&srv1).await.expect("sync save");
        assert_eq!(*h.decoder.decoded.lock().unwrap(), vec!["srv1".to_string()]);

        let srv2 = h.fleet.enabled_server("srv2").expect("srv2").clone();
        assert!(matches!(h.fleet.sync_save(&srv2).await, Err(FleetError::Configuration(_))));

        let _ = std::fs::remove_dir_all(save_dir);
        let _ = std::fs::remove_dir_all(h.dir);
    }
}
