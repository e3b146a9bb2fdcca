use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::{CommonError, report};

pub const SOURCE_DIR: &str = "source";
pub const OUTPUT_DIR: &str = "output";
pub const FILESTORE_DIR: &str = "filestore";
pub const CUSTOM_ADDONS_DIR: &str = "custom_addons";

pub const DB_COMPOSE_FILE: &str = "db-composer.yml";
pub const UPGRADE_COMPOSE_FILE: &str = "odoo-upgrade-composer.yml";
pub const DOCKERFILE: &str = "Dockerfile";

pub const DUMP_FILE: &str = "dump.sql";
pub const PACKAGE_FILE: &str = "upgraded.zip";

/// On-disk layout of a run, rooted at the directory the tool was started in.
///
/// Docker Compose resolves `./output/...` mounts and the build context
/// relative to this root, so every generated file lives directly under it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new<P: AsRef<Utf8Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn current() -> Result<Self, CommonError> {
        let cwd = std::env::current_dir()?;
        let root = Utf8PathBuf::try_from(cwd)
            .map_err(|err| CommonError::NonUtf8Path(err.into_path_buf()))?;
        Ok(Self::new(root))
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn source_dir(&self) -> Utf8PathBuf {
        self.root.join(SOURCE_DIR)
    }

    #[must_use]
    pub fn output_dir(&self) -> Utf8PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    #[must_use]
    pub fn filestore_dir(&self) -> Utf8PathBuf {
        self.output_dir().join(FILESTORE_DIR)
    }

    #[must_use]
    pub fn custom_addons_dir(&self) -> Utf8PathBuf {
        self.output_dir().join(CUSTOM_ADDONS_DIR)
    }

    #[must_use]
    pub fn db_compose_file(&self) -> Utf8PathBuf {
        self.root.join(DB_COMPOSE_FILE)
    }

    #[must_use]
    pub fn upgrade_compose_file(&self) -> Utf8PathBuf {
        self.root.join(UPGRADE_COMPOSE_FILE)
    }

    #[must_use]
    pub fn dockerfile(&self) -> Utf8PathBuf {
        self.root.join(DOCKERFILE)
    }

    #[must_use]
    pub fn dump_file(&self) -> Utf8PathBuf {
        self.output_dir().join(DUMP_FILE)
    }

    #[must_use]
    pub fn package_file(&self) -> Utf8PathBuf {
        self.output_dir().join(PACKAGE_FILE)
    }

    /// Wipes leftovers from a previous run and recreates the layout.
    pub fn prepare(&self) -> Result<(), CommonError> {
        info!("Preparing environment directories...");
        remove_dir_lenient(&self.source_dir());
        remove_dir_lenient(&self.output_dir());

        fs_err::create_dir_all(self.source_dir())?;
        fs_err::create_dir_all(self.filestore_dir())?;
        fs_err::create_dir_all(self.custom_addons_dir())?;

        // The Odoo container runs as its own uid and writes logs into output/.
        if let Err(err) = set_mode_recursive(self.output_dir().as_std_path(), 0o777) {
            warn!("Could not set broad permissions on output dir: {err}");
        }

        Ok(())
    }

    /// Removes everything but the final package from `output/` along with
    /// the extracted source.
    pub fn remove_artifacts(&self) {
        info!("Cleaning up artifacts...");
        remove_dir_lenient(&self.source_dir());
        remove_dir_lenient(&self.filestore_dir());
        remove_dir_lenient(&self.custom_addons_dir());
    }

    /// Deletes the compose files and Dockerfile generated for the run.
    pub fn remove_generated_files(&self) {
        for file in [
            self.dockerfile(),
            self.upgrade_compose_file(),
            self.db_compose_file(),
        ] {
            if file.exists() {
                if let Err(err) = fs_err::remove_file(file.as_std_path()) {
                    warn!("{err}");
                }
            }
        }
    }
}

/// Removes a directory tree, downgrading failures to a warning.
pub fn remove_dir_lenient(path: &Utf8Path) {
    if !path.exists() {
        return;
    }

    match fs_err::remove_dir_all(path.as_std_path()) {
        Ok(()) => debug!("Removed directory: {path}"),
        Err(err) => {
            let msg = err.to_string();
            report::warning(&msg);
            warn!("{msg}");
        }
    }
}

/// Applies `mode` to `path` and everything below it. No-op off unix.
#[cfg(unix)]
pub fn set_mode_recursive(path: &std::path::Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs_err::set_permissions(path, std::fs::Permissions::from_mode(mode))?;

    if path.is_dir() {
        for entry in fs_err::read_dir(path)? {
            set_mode_recursive(&entry?.path(), mode)?;
        }
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode_recursive(_path: &std::path::Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
