use std::io::Cursor;
use std::path::Path;

use tracing::debug;

use fleet_core::FleetError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Downloads `url` into `dest`. Zip payloads are unpacked in place; anything else is written
/// as a single file named after the last path segment.
pub(super) async fn download_into(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), FleetError> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| FleetError::SourceUnavailable(format!("GET {url}: {err}")))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|err| FleetError::SourceUnavailable(format!("GET {url}: {err}")))?;
    debug!(url, bytes = bytes.len(), "downloaded save payload");

    let dest = dest.to_path_buf();
    let name = file_name_for(url);
    tokio::task::spawn_blocking(move || {
        if bytes.starts_with(ZIP_MAGIC) {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|err| FleetError::SourceUnavailable(format!("bad zip payload: {err}")))?;
            archive
                .extract(&dest)
                .map_err(|err| FleetError::SourceUnavailable(format!("extract zip payload: {err}")))
        } else {
            std::fs::write(dest.join(name), &bytes)
                .map_err(|err| FleetError::io("writing downloaded save", err))
        }
    })
    .await
    .map_err(|err| FleetError::SourceUnavailable(format!("extract task failed: {err}")))?
}

fn file_name_for(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| "Level.sav".to_string())
}
