use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::FetchError;

/// Extracts every entry of `archive` below `dest` and returns how many
/// entries were read. Entries with absolute paths or `..` components are
/// refused.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, FetchError> {
    let invalid = |source| FetchError::InvalidArchive {
        path: archive.to_path_buf(),
        source,
    };

    let file = fs_err::File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(invalid)?;

    fs_err::create_dir_all(dest)?;

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx).map_err(invalid)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FetchError::UnsafeEntry(entry.name().to_owned()));
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs_err::create_dir_all(&out)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut writer = fs_err::File::create(&out)?;
        io::copy(&mut entry, &mut writer)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&out, std::fs::Permissions::from_mode(mode))?;
        }
    }

    debug!(entries = zip.len(), "extracted {}", archive.display());
    Ok(zip.len())
}

/// Builds the deliverable: `dump` stored as `dump.sql` at the root, plus
/// every file below `filestore` named relative to `output_dir`
/// (`filestore/ab/abcdef...`). Returns the number of entries written.
pub fn package(
    output_dir: &Path,
    dump: &Path,
    filestore: &Path,
    dest: &Path,
) -> Result<usize, FetchError> {
    info!("Packaging {}", dest.display());

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut zip = ZipWriter::new(fs_err::File::create(dest)?);

    zip.start_file("dump.sql", options)?;
    io::copy(&mut fs_err::File::open(dump)?, &mut zip)?;
    let mut entries = 1;

    if filestore.exists() {
        for path in files_below(filestore)? {
            let name = archive_name(output_dir, &path);
            zip.start_file(name, options)?;
            io::copy(&mut fs_err::File::open(&path)?, &mut zip)?;
            entries += 1;
        }
    }

    zip.finish()?;

    Ok(entries)
}

/// Every regular file below `dir`, sorted for reproducible archives.
pub(crate) fn files_below(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = vec![];
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs_err::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn archive_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);

    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
