use std::path::{Path, PathBuf};

pub struct RuntimePaths {
    pub runtime_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
}

const APP_ID: &str = "fleetd";

/// Environment override for the runtime directory, mostly for running several daemons side by side.
pub const RUNTIME_DIR_ENV: &str = "FLEETD_RUNTIME_DIR";

pub fn runtime_paths() -> RuntimePaths {
    if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV) {
        return mk(PathBuf::from(dir));
    }

    // Linux: prefer XDG_RUNTIME_DIR if present.
    if let Some(xdg) = std::env::var_os("XDG_RUNTIME_DIR") {
        return mk(PathBuf::from(xdg).join(APP_ID));
    }

    // macOS: use TMPDIR. (Also fine as Linux fallback.)
    if let Some(tmp) = std::env::var_os("TMPDIR") {
        return mk(PathBuf::from(tmp).join(APP_ID));
    }

    mk(std::env::temp_dir().join(APP_ID))
}

fn mk(runtime_dir: PathBuf) -> RuntimePaths {
    RuntimePaths {
        socket_path: runtime_dir.join("fleetd.sock"),
        lock_path: runtime_dir.join("fleetd.lock"),
        runtime_dir,
    }
}

pub fn ensure_dir(p: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(p)
}

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_and_lock_live_inside_runtime_dir() {
        let paths = mk(PathBuf::from("/run/user/1000/fleetd"));
        assert_eq!(paths.socket_path, PathBuf::from("/run/user/1000/fleetd/fleetd.sock"));
        assert_eq!(paths.lock_path, PathBuf::from("/run/user/1000/fleetd/fleetd.lock"));
    }
}
