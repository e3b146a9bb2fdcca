use std::{io, path::Path};

use odoo_upgrader_common::{Location, Workspace, report};
use tracing::{info, warn};

use crate::{FetchError, Fetcher, extract_zip};

const MANIFESTS: [&str; 2] = ["__manifest__.py", "__openerp__.py"];
const FLAT_MODULE_DIR: &str = "downloaded_module";
const REQUIREMENTS: &str = "requirements.txt";

/// Materializes custom addons into `output/custom_addons`, shaped the way
/// the upgrade image expects: one directory per module, plus a
/// `requirements.txt` at the root.
pub async fn prepare_addons(
    fetcher: &Fetcher,
    location: &Location,
    workspace: &Workspace,
) -> Result<(), FetchError> {
    report::step("Processing custom addons...");
    info!("Processing custom addons...");

    let addons_dir = workspace.custom_addons_dir();
    let addons_dir = addons_dir.as_std_path();

    match location {
        Location::Remote(url) => {
            let zip_path = workspace.source_dir().join("addons.zip");
            fetcher
                .download(url, zip_path.as_std_path(), "Downloading extra addons...")
                .await?;
            extract_zip(zip_path.as_std_path(), addons_dir)?;
            fs_err::remove_file(&zip_path)?;
        }
        Location::Local(path) if path.is_file() && is_zip(path) => {
            extract_zip(path, addons_dir)?;
        }
        Location::Local(path) if path.is_dir() => {
            copy_dir_all(path, addons_dir)?;
        }
        Location::Local(path) => return Err(FetchError::UnsupportedAddons(path.clone())),
    }

    normalize_layout(addons_dir)?;
    ensure_requirements(addons_dir)?;

    info!("Standardizing addon permissions...");
    normalize_permissions(addons_dir);

    report::success("Custom addons prepared.");
    Ok(())
}

/// Names of the module directories directly below `dir`, sorted.
pub fn module_names(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut modules = vec![];
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && has_manifest(&path) {
            modules.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    modules.sort();
    Ok(modules)
}

fn normalize_layout(dir: &Path) -> io::Result<()> {
    flatten_wrapper(dir)?;

    if has_manifest(dir) {
        info!("Detected flat addon structure. Reorganizing...");
        let module_dir = dir.join(FLAT_MODULE_DIR);
        fs_err::create_dir_all(&module_dir)?;

        for entry in fs_err::read_dir(dir)? {
            let path = entry?.path();
            if path != module_dir {
                if let Some(name) = path.file_name() {
                    fs_err::rename(&path, module_dir.join(name))?;
                }
            }
        }
    }

    Ok(())
}

/// Archives downloaded from forges wrap everything in `<repo>-<branch>/`.
/// When that single visible directory is not itself a module, its children
/// are moved up one level.
fn flatten_wrapper(dir: &Path) -> io::Result<()> {
    let visible: Vec<_> = fs_err::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .collect();

    let [wrapper] = visible.as_slice() else {
        return Ok(());
    };

    let wrapper_path = wrapper.path();
    if !wrapper_path.is_dir() || has_manifest(&wrapper_path) {
        return Ok(());
    }

    info!(
        "Detected wrapper directory '{}'. Flattening structure...",
        wrapper.file_name().to_string_lossy()
    );

    for entry in fs_err::read_dir(&wrapper_path)? {
        let entry = entry?;
        let target = dir.join(entry.file_name());
        if !target.exists() {
            fs_err::rename(entry.path(), target)?;
        }
    }

    // Leftovers that collided with existing names keep the wrapper alive.
    if let Err(err) = std::fs::remove_dir(&wrapper_path) {
        warn!("Kept wrapper directory {}: {err}", wrapper_path.display());
    }

    Ok(())
}

fn ensure_requirements(dir: &Path) -> io::Result<()> {
    let path = dir.join(REQUIREMENTS);

    if !path.exists() {
        fs_err::write(&path, "")?;
    } else if fs_err::metadata(&path)?.len() == 0 {
        warn!("Empty requirements.txt found in custom addons.");
    }

    Ok(())
}

fn has_manifest(dir: &Path) -> bool {
    MANIFESTS.iter().any(|manifest| dir.join(manifest).exists())
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Recursively copies `src` into `dest`, creating `dest` as needed.
pub fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    fs_err::create_dir_all(dest)?;

    for entry in fs_err::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs_err::copy(entry.path(), target)?;
        }
    }

    Ok(())
}

/// Directories and shell scripts get `0755`, everything else `0644`, so the
/// `odoo` user inside the image can read what was copied in. Best effort.
#[cfg(unix)]
fn normalize_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let mode = if path.is_dir() {
            normalize_permissions(&path);
            0o755
        } else if path.extension().is_some_and(|ext| ext == "sh") {
            0o755
        } else {
            0o644
        };

        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode));
    }
}

#[cfg(not(unix))]
fn normalize_permissions(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn module(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir.join(name)).unwrap();
        std::fs::write(dir.join(name).join("__manifest__.py"), "{}").unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn wrapper_directory_is_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = dir.path().join("my-addons-16.0");
        module(&wrapper, "sale_extra");
        module(&wrapper, "stock_extra");

        normalize_layout(dir.path()).unwrap();

        assert_eq!(names(dir.path()), vec!["sale_extra", "stock_extra"]);
    }

    #[test]
    fn single_module_is_not_treated_as_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        module(dir.path(), "sale_extra");

        normalize_layout(dir.path()).unwrap();

        assert_eq!(names(dir.path()), vec!["sale_extra"]);
    }

    #[test]
    fn flat_module_is_nested() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("__manifest__.py"), "{}").unwrap();
        std::fs::write(dir.path().join("models.py"), "").unwrap();

        normalize_layout(dir.path()).unwrap();

        assert_eq!(names(dir.path()), vec!["downloaded_module"]);
        assert_eq!(
            names(&dir.path().join("downloaded_module")),
            vec!["__manifest__.py", "models.py"]
        );
    }

    #[test]
    fn hidden_entries_do_not_block_flattening() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitattributes"), "").unwrap();
        module(&dir.path().join("repo-main"), "crm_extra");

        normalize_layout(dir.path()).unwrap();

        assert!(dir.path().join("crm_extra").is_dir());
        assert!(!dir.path().join("repo-main").exists());
    }

    #[test]
    fn requirements_file_is_created() {
        let dir = tempfile::tempdir().unwrap();

        ensure_requirements(dir.path()).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join(REQUIREMENTS)).unwrap(), "");
    }

    #[test]
    fn existing_requirements_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REQUIREMENTS), "phonenumbers\n").unwrap();

        ensure_requirements(dir.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join(REQUIREMENTS)).unwrap(),
            "phonenumbers\n"
        );
    }

    #[test]
    fn module_names_skip_plain_directories() {
        let dir = tempfile::tempdir().unwrap();
        module(dir.path(), "b_module");
        module(dir.path(), "a_module");
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join(REQUIREMENTS), "").unwrap();

        assert_eq!(module_names(dir.path()).unwrap(), vec!["a_module", "b_module"]);
    }

    #[test]
    fn local_directory_is_copied() {
        let src = tempfile::tempdir().unwrap();
        module(src.path(), "web_extra");
        let dest = tempfile::tempdir().unwrap();

        copy_dir_all(src.path(), dest.path()).unwrap();

        assert!(dest.path().join("web_extra/__manifest__.py").exists());
    }

    fn prepared_workspace(dir: &Path) -> Workspace {
        let workspace = Workspace::new(dir.to_str().unwrap());
        workspace.prepare().unwrap();
        workspace
    }

    #[tokio::test]
    async fn plain_file_is_not_an_addons_source() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = prepared_workspace(dir.path());
        let notes = dir.path().join("addons.txt");
        std::fs::write(&notes, "sale_extra").unwrap();
        let fetcher = Fetcher::new(&Default::default()).unwrap();

        let err = prepare_addons(&fetcher, &Location::Local(notes.clone()), &workspace)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnsupportedAddons(path) if path == notes));
    }

    #[tokio::test]
    async fn local_folder_becomes_custom_addons() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = prepared_workspace(dir.path());
        let src = tempfile::tempdir().unwrap();
        module(&src.path().join("my-addons-16.0"), "sale_extra");
        let fetcher = Fetcher::new(&Default::default()).unwrap();

        prepare_addons(&fetcher, &Location::Local(src.path().to_path_buf()), &workspace)
            .await
            .unwrap_or_else(|err| panic!("{err}"));

        let addons = workspace.custom_addons_dir();
        assert_eq!(module_names(addons.as_std_path()).unwrap(), vec!["sale_extra"]);
        assert!(addons.join(REQUIREMENTS).exists());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_normalized() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        module(dir.path(), "tools");
        std::fs::write(dir.path().join("tools/run.sh"), "#!/bin/sh").unwrap();

        normalize_permissions(dir.path());

        let mode = |p: &str| {
            std::fs::metadata(dir.path().join(p)).unwrap().permissions().mode() & 0o777
        };
        assert_eq!(mode("tools"), 0o755);
        assert_eq!(mode("tools/run.sh"), 0o755);
        assert_eq!(mode("tools/__manifest__.py"), 0o644);
    }
}
