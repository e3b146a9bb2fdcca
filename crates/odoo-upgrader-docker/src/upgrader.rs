use std::path::PathBuf;

use camino::Utf8PathBuf;
use odoo_upgrader_common::{Location, OdooVersion, Settings, SourceKind, Workspace, report};
use odoo_upgrader_fetch::{Fetcher, extract_zip, package, prepare_addons};
use tracing::{error, info, warn};

use crate::{Compose, Database, Runner, STAGED_DUMP_FILE, UpgradeError, ensure_docker};

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub source: Location,
    pub target: OdooVersion,
    pub extra_addons: Option<Location>,
    pub verbose: bool,
}

/// Drives one database from its current series to the target series.
pub struct Upgrader<R> {
    pub(crate) runner: R,
    pub(crate) compose: Compose,
    pub(crate) fetcher: Fetcher,
    pub(crate) settings: Settings,
    pub(crate) workspace: Workspace,
    pub(crate) options: UpgradeOptions,
}

impl<R: Runner> Upgrader<R> {
    pub fn new(
        runner: R,
        compose: Compose,
        fetcher: Fetcher,
        settings: Settings,
        workspace: Workspace,
        options: UpgradeOptions,
    ) -> Self {
        Self {
            runner,
            compose,
            fetcher,
            settings,
            workspace,
            options,
        }
    }

    fn database(&self) -> Database<'_, R> {
        Database::new(
            &self.runner,
            &self.compose,
            &self.settings.database,
            &self.settings.upgrade,
            &self.workspace,
        )
    }

    /// Runs the whole upgrade and always tears the Docker environment down
    /// afterwards, including on Ctrl-C. Returns the path of the package.
    pub async fn execute(&self) -> Result<Utf8PathBuf, UpgradeError> {
        info!("Starting OdooUpgrader...");

        let outcome = tokio::select! {
            res = self.run() => res,
            _ = tokio::signal::ctrl_c() => {
                report::failure("Operation cancelled by user.");
                info!("Operation cancelled by user");
                Err(UpgradeError::Cancelled)
            }
        };

        self.cleanup().await;
        outcome
    }

    /// Docker, source and addons checks. Touches nothing on disk.
    pub async fn validate(&self) -> Result<(), UpgradeError> {
        ensure_docker(&self.runner).await?;

        report::step("Validating source accessibility...");
        info!("Validating source: {}", self.options.source);

        match &self.options.source {
            Location::Remote(url) => {
                self.fetcher.probe_source(url).await.map_err(|source| {
                    error!("Source URL invalid: {source}");
                    UpgradeError::SourceUnreachable {
                        url: url.to_string(),
                        source,
                    }
                })?;
                report::success("Source URL is accessible.");
            }
            Location::Local(path) => {
                if !path.exists() {
                    error!("Source file not found: {}", path.display());
                    return Err(UpgradeError::SourceNotFound(path.clone()));
                }
                report::success("Source file exists.");
            }
        }

        if let Some(addons) = &self.options.extra_addons {
            report::step("Validating extra addons...");
            match addons {
                Location::Remote(url) => {
                    self.fetcher.probe_addons(url).await.map_err(|source| {
                        error!("Extra addons URL invalid");
                        UpgradeError::AddonsUnreachable {
                            url: url.to_string(),
                            source,
                        }
                    })?;
                }
                Location::Local(path) if !path.exists() => {
                    error!("Extra addons path not found: {}", path.display());
                    return Err(UpgradeError::AddonsNotFound(path.clone()));
                }
                Location::Local(_) => {}
            }
        }

        Ok(())
    }

    /// The upgrade without the teardown.
    pub async fn run(&self) -> Result<Utf8PathBuf, UpgradeError> {
        self.validate().await?;
        self.workspace.prepare()?;

        if let Some(addons) = &self.options.extra_addons {
            prepare_addons(&self.fetcher, addons, &self.workspace).await?;
        }

        let db = self.database();
        db.start().await?;
        db.wait_ready().await?;

        let (local_source, downloaded) = self.fetch_source().await?;
        let kind = self.stage_source(&local_source)?;

        if downloaded && local_source.exists() {
            fs_err::remove_file(&local_source)?;
        }

        db.restore(kind).await?;

        let current = self.detect_version().await?;
        report::banner(&format!("Current Database Version: {current}"));

        if current.is_below_minimum() {
            return Err(UpgradeError::UnsupportedSource(current));
        }

        self.climb(current).await?;
        self.finalize().await
    }

    /// One OpenUpgrade run per major series until the target is reached.
    async fn climb(&self, mut current: OdooVersion) -> Result<(), UpgradeError> {
        let target = self.options.target;

        loop {
            if current.same_major(target) {
                report::success("Target version reached!");
                return Ok(());
            }

            if current.major > target.major {
                report::warning("Current version is already higher than target.");
                return Ok(());
            }

            let next = current.next_major();
            if let Err(err) = self.run_step(next, next.same_major(target)).await {
                report::failure("Aborting sequence.");
                return Err(err);
            }

            // OpenUpgrade can exit cleanly without migrating anything, e.g.
            // when base was never marked installed.
            let reached = match self.reached_version().await? {
                Some(reached) if reached.major > current.major => reached,
                found => {
                    report::failure("Database version did not advance.");
                    return Err(UpgradeError::NoProgress {
                        expected: next,
                        found,
                    });
                }
            };
            report::step(&format!("Database is now at version: {reached}"));

            current = reached;
        }
    }

    async fn detect_version(&self) -> Result<OdooVersion, UpgradeError> {
        let Some(raw) = self.database().current_version().await? else {
            report::failure("Could not determine database version.");
            error!("Could not determine database version");
            return Err(UpgradeError::UnknownVersion);
        };

        info!("Current Database Version: {raw}");
        Ok(raw.parse()?)
    }

    /// The version after a step; unreadable output counts as unknown.
    async fn reached_version(&self) -> Result<Option<OdooVersion>, UpgradeError> {
        let raw = self.database().current_version().await?;

        Ok(raw.and_then(|raw| match raw.parse::<OdooVersion>() {
            Ok(version) => Some(version),
            Err(err) => {
                warn!("Unreadable database version after upgrade step: {err}");
                None
            }
        }))
    }

    /// Remote backups are downloaded next to the workspace; local ones are
    /// used in place. The flag tells whether the file is ours to delete.
    async fn fetch_source(&self) -> Result<(PathBuf, bool), UpgradeError> {
        match &self.options.source {
            Location::Remote(url) => {
                let dest = self
                    .workspace
                    .root()
                    .join(self.options.source.file_name())
                    .into_std_path_buf();
                self.fetcher
                    .download(url, &dest, "Downloading source DB...")
                    .await?;
                Ok((dest, true))
            }
            Location::Local(path) => Ok((path.clone(), false)),
        }
    }

    fn stage_source(&self, path: &std::path::Path) -> Result<SourceKind, UpgradeError> {
        let kind = SourceKind::detect(path);
        let source_dir = self.workspace.source_dir();

        match kind {
            SourceKind::Zip => {
                report::step("Extracting ZIP file...");
                info!("Extracting ZIP file...");
                extract_zip(path, source_dir.as_std_path())?;
            }
            SourceKind::Dump => {
                report::step("Processing DUMP file...");
                info!("Processing DUMP file...");
                fs_err::copy(path, source_dir.join(STAGED_DUMP_FILE))?;
            }
        }

        Ok(kind)
    }

    async fn finalize(&self) -> Result<Utf8PathBuf, UpgradeError> {
        report::step("Creating final package...");
        info!("Creating final package...");

        let dump = self.workspace.dump_file();
        if let Err(err) = self.database().dump_to(dump.as_std_path()).await {
            error!("Failed to dump database: {err}");
            return Err(err);
        }

        let package_file = self.workspace.package_file();
        package(
            self.workspace.output_dir().as_std_path(),
            dump.as_std_path(),
            self.workspace.filestore_dir().as_std_path(),
            package_file.as_std_path(),
        )?;

        report::success(&format!(
            "Upgrade Complete! Package available at: {package_file}"
        ));
        info!("Upgrade Complete. Package: {package_file}");

        fs_err::remove_file(&dump)?;
        self.workspace.remove_artifacts();

        Ok(package_file)
    }

    /// Stops the database, drops its volume and deletes generated files.
    pub async fn cleanup(&self) {
        report::detail("Cleaning up Docker environment...");
        info!("Cleaning up Docker environment...");

        self.database().teardown().await;
        self.workspace.remove_generated_files();
    }
}

impl<R> Drop for Upgrader<R> {
    fn drop(&mut self) {
        if self.workspace.db_compose_file().exists() {
            warn!(
                "{} left behind; run `{} -f {} down -v` to remove the database",
                self.workspace.db_compose_file(),
                self.compose,
                self.workspace.db_compose_file()
            );
        }
    }
}
