use std::fs::File;
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use fleet_core::FleetError;

/// Zips the contents of `src` into `dest`. The archive is written next to `dest` under a
/// `.tmp` name and renamed into place only once it is complete.
pub fn zip_dir(src: &Path, dest: &Path) -> Result<(), FleetError> {
    let mut tmp_name = dest.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    if let Err(err) = write_zip(src, tmp) {
        let _ = std::fs::remove_file(tmp);
        return Err(err);
    }
    std::fs::rename(tmp, dest).map_err(|err| {
        let _ = std::fs::remove_file(tmp);
        FleetError::io("moving backup archive into place", err)
    })
}

fn write_zip(src: &Path, tmp: &Path) -> Result<(), FleetError> {
    let file = File::create(tmp).map_err(|err| FleetError::io("creating backup archive", err))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| FleetError::Io {
            context: "walking backup source",
            source: err.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_error)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(zip_error)?;
            let mut input =
                File::open(entry.path()).map_err(|err| FleetError::io("reading backup source", err))?;
            io::copy(&mut input, &mut zip).map_err(|err| FleetError::io("writing backup archive", err))?;
        }
    }

    let file = zip.finish().map_err(zip_error)?;
    file.sync_all().map_err(|err| FleetError::io("flushing backup archive", err))
}

fn zip_error(err: zip::result::ZipError) -> FleetError {
    FleetError::Io {
        context: "writing backup archive",
        source: err.into(),
    }
}
