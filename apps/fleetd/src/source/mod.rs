//! Turns a save origin descriptor into a scratch directory holding a copy of the save data.

pub mod cache;
mod container;
mod http;
mod local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

use fleet_core::FleetError;

pub use cache::TEMP_PREFIX;
pub use container::ContainerTools;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local(PathBuf),
    Http(String),
    Pod {
        namespace: String,
        pod: String,
        container: String,
        remote_path: String,
    },
    Container {
        container: String,
        remote_path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Decode,
    Backup,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Decode => "decode",
            Purpose::Backup => "backup",
        }
    }
}

impl Origin {
    pub fn parse(raw: &str) -> Result<Self, FleetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FleetError::Configuration("save origin is empty".into()));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            url::Url::parse(raw)
                .map_err(|err| FleetError::InvalidAddress(format!("{raw}: {err}")))?;
            return Ok(Origin::Http(raw.to_string()));
        }

        if let Some(rest) = raw.strip_prefix("k8s://") {
            return parse_k8s_address(rest)
                .ok_or_else(|| {
                    FleetError::InvalidAddress(format!(
                        "{raw}: expected k8s://namespace/pod/container:remotePath"
                    ))
                });
        }

        if let Some(rest) = raw.strip_prefix("docker://") {
            return parse_docker_address(rest).ok_or_else(|| {
                FleetError::InvalidAddress(format!(
                    "{raw}: expected docker://container:remotePath"
                ))
            });
        }

        Ok(Origin::Local(PathBuf::from(raw)))
    }
}

fn parse_k8s_address(rest: &str) -> Option<Origin> {
    let (location, remote_path) = rest.split_once(':')?;
    let parts: Vec<&str> = location.split('/').collect();
    let [namespace, pod, container] = parts.as_slice() else {
        return None;
    };
    if [namespace, pod, container, &remote_path].iter().any(|part| part.trim().is_empty()) {
        return None;
    }
    Some(Origin::Pod {
        namespace: namespace.to_string(),
        pod: pod.to_string(),
        container: container.to_string(),
        remote_path: remote_path.to_string(),
    })
}

fn parse_docker_address(rest: &str) -> Option<Origin> {
    let (container, remote_path) = rest.split_once(':')?;
    if container.trim().is_empty() || container.contains('/') || remote_path.trim().is_empty() {
        return None;
    }
    Some(Origin::Container {
        container: container.to_string(),
        remote_path: remote_path.to_string(),
    })
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local(path) => write!(f, "{}", path.display()),
            Origin::Http(url) => write!(f, "{url}"),
            Origin::Pod { namespace, pod, container, remote_path } => {
                write!(f, "k8s://{namespace}/{pod}/{container}:{remote_path}")
            }
            Origin::Container { container, remote_path } => {
                write!(f, "docker://{container}:{remote_path}")
            }
        }
    }
}

/// A resolved copy of the save data. The directory is removed when this value drops.
#[derive(Debug)]
pub struct ResolvedSource {
    dir: TempDir,
}

impl ResolvedSource {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// First regular file called `name` anywhere under the resolved directory.
    pub fn find_file(&self, name: &str) -> Option<PathBuf> {
        walkdir::WalkDir::new(self.dir.path())
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
            .map(walkdir::DirEntry::into_path)
    }
}

pub struct SourceResolver {
    http: reqwest::Client,
    command_timeout: Duration,
    tools: ContainerTools,
    scratch_root: PathBuf,
}

impl SourceResolver {
    pub fn new(download_timeout: Duration, command_timeout: Duration) -> Result<Self, FleetError> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|err| FleetError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            http,
            command_timeout,
            tools: ContainerTools::default(),
            scratch_root: std::env::temp_dir(),
        })
    }

    /// Place scratch directories somewhere other than the system temp dir.
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn with_container_tools(mut self, tools: ContainerTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub async fn resolve(&self, origin: &Origin, purpose: Purpose) -> Result<ResolvedSource, FleetError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{TEMP_PREFIX}{}-", purpose.as_str()))
            .tempdir_in(&self.scratch_root)
            .map_err(|err| FleetError::SourceUnavailable(format!("create scratch dir: {err}")))?;
        debug!(origin = %origin, dir = %dir.path().display(), "resolving save origin");

        // On failure `dir` drops here and takes any partial copy with it.
        let copied = match origin {
            Origin::Local(path) => local::copy_into(path, dir.path()).await,
            Origin::Http(url) => http::download_into(&self.http, url, dir.path()).await,
            Origin::Pod { namespace, pod, container, remote_path } => {
                container::copy_from_pod(
                    &self.tools.kubectl,
                    namespace,
                    pod,
                    container,
                    remote_path,
                    dir.path(),
                    self.command_timeout,
                )
                .await
            }
            Origin::Container { container, remote_path } => {
                container::copy_from_container(
                    &self.tools.docker,
                    container,
                    remote_path,
                    dir.path(),
                    self.command_timeout,
                )
                .await
            }
        };

        copied.map_err(|err| match err {
            FleetError::SourceUnavailable(_) => err,
            other => FleetError::SourceUnavailable(format!("{origin}: {other}")),
        })?;

        Ok(ResolvedSource { dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::unique_temp_dir;

    #[test]
    fn parses_every_origin_kind() {
        assert_eq!(
            Origin::parse("/srv/pal/Saved").unwrap(),
            Origin::Local(PathBuf::from("/srv/pal/Saved"))
        );
        assert_eq!(
            Origin::parse("https://saves.example.com/Level.sav").unwrap(),
            Origin::Http("https://saves.example.com/Level.sav".into())
        );
        assert_eq!(
            Origin::parse("k8s://games/pal-0/server:/palworld/Pal/Saved").unwrap(),
            Origin::Pod {
                namespace: "games".into(),
                pod: "pal-0".into(),
                container: "server".into(),
                remote_path: "/palworld/Pal/Saved".into(),
            }
        );
        assert_eq!(
            Origin::parse("docker://palworld:/palworld/Pal/Saved").unwrap(),
            Origin::Container {
                container: "palworld".into(),
                remote_path: "/palworld/Pal/Saved".into(),
            }
        );
    }

    #[test]
    fn malformed_container_addresses_are_invalid() {
        for raw in [
            "k8s://games/pal-0:/saved",
            "k8s://games/pal-0/server/extra:/saved",
            "k8s://games//server:/saved",
            "k8s://games/pal-0/server:",
            "k8s://games/pal-0/server",
            "docker://:/saved",
            "docker://palworld",
            "docker://palworld:",
        ] {
            let err = Origin::parse(raw).unwrap_err();
            assert!(matches!(err, FleetError::InvalidAddress(_)), "{raw} -> {err}");
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let raw = "k8s://games/pal-0/server:/palworld/Pal/Saved";
        assert_eq!(Origin::parse(raw).unwrap().to_string(), raw);
    }

    #[tokio::test]
    async fn local_directory_is_copied_and_cleaned_up_on_drop() {
        let root = unique_temp_dir("resolve-local");
        let src = root.join("Saved");
        std::fs::create_dir_all(src.join("Players")).expect("create src");
        std::fs::write(src.join("Level.sav"), b"level").expect("write level");
        std::fs::write(src.join("Players").join("p1.sav"), b"p1").expect("write player");
        let scratch = root.join("scratch");
        std::fs::create_dir_all(&scratch).expect("create scratch");

        let resolver = SourceResolver::new(Duration::from_secs(5), Duration::from_secs(5))
            .expect("resolver")
            .with_scratch_root(scratch.clone());
        let resolved = resolver
            .resolve(&Origin::Local(src.clone()), Purpose::Decode)
            .await
            .expect("resolve local");

        let dir = resolved.path().to_path_buf();
        assert!(dir.file_name().unwrap().to_string_lossy().starts_with("fleetsav-decode-"));
        assert_eq!(std::fs::read(dir.join("Level.sav")).unwrap(), b"level");
        assert_eq!(std::fs::read(dir.join("Players").join("p1.sav")).unwrap(), b"p1");
        assert_eq!(resolved.find_file("p1.sav"), Some(dir.join("Players").join("p1.sav")));

        drop(resolved);
        assert!(!dir.exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_local_source_leaves_no_scratch_dir_behind() {
        let root = unique_temp_dir("resolve-missing");
        std::fs::create_dir_all(&root).expect("create root");

        let resolver = SourceResolver::new(Duration::from_secs(5), Duration::from_secs(5))
            .expect("resolver")
            .with_scratch_root(root.clone());
        let err = resolver
            .resolve(&Origin::Local(root.join("nope")), Purpose::Backup)
            .await
            .unwrap_err();

        assert!(matches!(err, FleetError::SourceUnavailable(_)));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(root);
    }

    fn resolver_in(scratch: &Path, tools: ContainerTools) -> SourceResolver {
        SourceResolver::new(Duration::from_secs(5), Duration::from_secs(5))
            .expect("resolver")
            .with_scratch_root(scratch.to_path_buf())
            .with_container_tools(tools)
    }

    /// Shell stand-in for `kubectl cp` / `docker cp`: writes a save into the last argument.
    fn fake_copy_tool(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nfor last; do :; done\nprintf level > \"$last\"\n")
            .expect("write tool");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod tool");
        path
    }

    fn pod_origin() -> Origin {
        Origin::parse("k8s://games/pal-0/server:/palworld/Level.sav").unwrap()
    }

    fn container_origin() -> Origin {
        Origin::parse("docker://palworld:/palworld/Level.sav").unwrap()
    }

    #[tokio::test]
    async fn container_origins_copy_through_their_tools() {
        let root = unique_temp_dir("resolve-container");
        let scratch = root.join("scratch");
        std::fs::create_dir_all(&scratch).expect("create scratch");
        let tools = ContainerTools {
            kubectl: fake_copy_tool(&root, "kubectl"),
            docker: fake_copy_tool(&root, "docker"),
        };
        let resolver = resolver_in(&scratch, tools);

        for origin in [pod_origin(), container_origin()] {
            let resolved = resolver.resolve(&origin, Purpose::Backup).await.expect("resolve");
            let level = resolved.find_file("Level.sav").expect("copied save");
            assert_eq!(std::fs::read(level).unwrap(), b"level");
        }

        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_copy_tool_is_unavailable_and_cleans_up() {
        let root = unique_temp_dir("resolve-no-tool");
        std::fs::create_dir_all(&root).expect("create root");
        let tools = ContainerTools {
            kubectl: root.join("no-kubectl"),
            docker: root.join("no-docker"),
        };
        let resolver = resolver_in(&root, tools);

        for origin in [pod_origin(), container_origin()] {
            let err = resolver.resolve(&origin, Purpose::Decode).await.unwrap_err();
            assert!(matches!(err, FleetError::SourceUnavailable(_)), "{origin} -> {err}");
            assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0, "{origin} left a scratch dir");
        }
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn failing_copy_tool_is_unavailable_and_cleans_up() {
        let root = unique_temp_dir("resolve-tool-fails");
        std::fs::create_dir_all(&root).expect("create root");
        let tools = ContainerTools {
            kubectl: PathBuf::from("false"),
            docker: PathBuf::from("false"),
        };
        let resolver = resolver_in(&root, tools);

        for origin in [pod_origin(), container_origin()] {
            let err = resolver.resolve(&origin, Purpose::Backup).await.unwrap_err();
            assert!(matches!(err, FleetError::SourceUnavailable(_)), "{origin} -> {err}");
            assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0, "{origin} left a scratch dir");
        }
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn refused_download_is_unavailable_and_cleans_up() {
        let root = unique_temp_dir("resolve-http-refused");
        std::fs::create_dir_all(&root).expect("create root");
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let resolver = resolver_in(&root, ContainerTools::default());

        let origin = Origin::parse(&format!("http://127.0.0.1:{port}/Level.sav")).unwrap();
        let err = resolver.resolve(&origin, Purpose::Decode).await.unwrap_err();

        assert!(matches!(err, FleetError::SourceUnavailable(_)), "{err}");
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(root);
    }
}
