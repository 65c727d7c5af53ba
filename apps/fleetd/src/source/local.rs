use std::ffi::OsStr;
use std::path::Path;

use walkdir::WalkDir;

use fleet_core::FleetError;

pub(super) async fn copy_into(src: &Path, dest: &Path) -> Result<(), FleetError> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_blocking(&src, &dest))
        .await
        .map_err(|err| FleetError::SourceUnavailable(format!("copy task failed: {err}")))?
}

fn copy_blocking(src: &Path, dest: &Path) -> Result<(), FleetError> {
    let meta = std::fs::metadata(src).map_err(|err| {
        FleetError::SourceUnavailable(format!("{}: {err}", src.display()))
    })?;

    if meta.is_file() {
        let name = src.file_name().unwrap_or(OsStr::new("Level.sav"));
        std::fs::copy(src, dest.join(name))
            .map_err(|err| FleetError::io("copying save file", err))?;
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|err| FleetError::SourceUnavailable(err.to_string()))?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|err| FleetError::io("creating save directory", err))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| FleetError::io("creating save directory", err))?;
            }
            std::fs::copy(entry.path(), &target)
                .map_err(|err| FleetError::io("copying save file", err))?;
        }
    }
    Ok(())
}
