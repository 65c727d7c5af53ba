use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::net::{UnixListener, UnixStream};

/// Owner-only, since the socket can delete backups and edit whitelists.
const SOCKET_MODE: u32 = 0o600;

pub async fn connect(path: &Path) -> io::Result<UnixStream> {
    UnixStream::connect(path).await
}

/// Binds the control socket and restricts it to the daemon's user.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

/// Removes a socket file left behind by a daemon that did not exit cleanly. A missing
/// file is not an error.
pub fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

pub async fn socket_alive(path: &Path) -> bool {
    connect(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fleet-ipc-{name}-{}.sock", std::process::id()))
    }

    #[tokio::test]
    async fn bound_socket_is_private_and_alive() {
        let path = temp_socket("alive");
        remove_stale_socket(&path).expect("clear");

        let _listener = bind(&path).expect("bind");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);
        assert!(socket_alive(&path).await);

        remove_stale_socket(&path).expect("remove");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_socket_is_not_alive() {
        let path = temp_socket("missing");
        remove_stale_socket(&path).expect("removing a missing file is fine");
        assert!(!socket_alive(&path).await);
    }
}
