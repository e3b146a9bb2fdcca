use std::path::{Path, PathBuf};

use odoo_upgrader_common::{
    DatabaseSettings, SourceKind, UpgradeSettings, Workspace, report, set_mode_recursive,
};
use odoo_upgrader_fetch::copy_dir_all;
use tracing::{info, instrument, warn};

use crate::{Compose, Invocation, Runner, UpgradeError, render_db_compose, write_template};

/// Queries tried in order to find out which series the restored database
/// belongs to. Older databases may lack the installed `base` row or the
/// config parameter.
const VERSION_QUERIES: [&str; 3] = [
    "SELECT latest_version FROM ir_module_module WHERE name = 'base' AND state = 'installed';",
    "SELECT value FROM ir_config_parameter WHERE key = 'database.latest_version';",
    "SELECT latest_version FROM ir_module_module WHERE name = 'base' ORDER BY id DESC LIMIT 1;",
];

const CONTAINER_SQL_DUMP: &str = "/tmp/dump.sql";
const CONTAINER_CUSTOM_DUMP: &str = "/tmp/database.dump";
pub const STAGED_DUMP_FILE: &str = "database.dump";

/// The PostgreSQL container and the database restored into it.
pub struct Database<'a, R> {
    runner: &'a R,
    compose: &'a Compose,
    settings: &'a DatabaseSettings,
    upgrade: &'a UpgradeSettings,
    workspace: &'a Workspace,
}

impl<'a, R: Runner> Database<'a, R> {
    pub fn new(
        runner: &'a R,
        compose: &'a Compose,
        settings: &'a DatabaseSettings,
        upgrade: &'a UpgradeSettings,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            runner,
            compose,
            settings,
            upgrade,
            workspace,
        }
    }

    fn exec(&self) -> Invocation {
        Invocation::docker().arg("exec").arg(&self.settings.container)
    }

    fn psql(&self) -> Invocation {
        Invocation::docker()
            .args(["exec", "-i"])
            .arg(&self.settings.container)
            .args(["psql", "-U"])
            .arg(&self.settings.user)
            .arg("-d")
            .arg(&self.settings.name)
    }

    /// Renders the compose file and brings the service up detached.
    pub async fn start(&self) -> Result<(), UpgradeError> {
        let compose_file = self.workspace.db_compose_file();
        write_template(compose_file.as_std_path(), &render_db_compose(self.settings))?;

        let up = self.compose.file(compose_file.as_std_path(), ["up", "-d"]);
        self.runner.run(&up).await?.checked(&up)?;

        Ok(())
    }

    pub async fn wait_ready(&self) -> Result<(), UpgradeError> {
        report::warning("Waiting for database to be ready...");

        let probe = self
            .exec()
            .args(["pg_isready", "-U"])
            .arg(&self.settings.user)
            .arg("-d")
            .arg(&self.settings.maintenance_db);

        for attempt in 1..=self.upgrade.wait_retries {
            if self.runner.run(&probe).await?.success() {
                report::success("Database is ready.");
                return Ok(());
            }

            tracing::debug!(attempt, "database not ready yet");
            tokio::time::sleep(self.upgrade.wait_interval()).await;
        }

        report::failure("Database failed to start.");
        Err(UpgradeError::DatabaseNotReady(self.upgrade.wait_retries))
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, kind: SourceKind) -> Result<(), UpgradeError> {
        report::step("Restoring database...");
        info!("Restoring database...");

        // Fails harmlessly when the volume already holds the database.
        let createdb = self
            .exec()
            .args(["createdb", "-U"])
            .arg(&self.settings.user)
            .arg(&self.settings.name);
        self.runner.run(&createdb).await?;

        match kind {
            SourceKind::Zip => self.restore_sql().await,
            SourceKind::Dump => self.restore_custom().await,
        }
    }

    async fn restore_sql(&self) -> Result<(), UpgradeError> {
        let source_dir = self.workspace.source_dir();
        let dump = locate_sql_dump(source_dir.as_std_path())?.ok_or(UpgradeError::MissingDump)?;

        self.copy_filestore();

        self.copy_into_container(&dump, CONTAINER_SQL_DUMP).await?;

        let restore = self.psql().args(["-f", CONTAINER_SQL_DUMP]);
        self.runner.run(&restore).await?.checked(&restore)?;

        Ok(())
    }

    async fn restore_custom(&self) -> Result<(), UpgradeError> {
        let dump = self.workspace.source_dir().join(STAGED_DUMP_FILE);
        self.copy_into_container(dump.as_std_path(), CONTAINER_CUSTOM_DUMP)
            .await?;

        let restore = self
            .exec()
            .args(["pg_restore", "-U"])
            .arg(&self.settings.user)
            .arg("-d")
            .arg(&self.settings.name)
            .args([
                "--no-owner",
                "--no-privileges",
                "--clean",
                "--if-exists",
                "--disable-triggers",
                "--single-transaction",
                CONTAINER_CUSTOM_DUMP,
            ]);

        // pg_restore exits non-zero on harmless warnings (missing roles,
        // extensions owned by someone else); the version probe catches real
        // failures.
        let output = self.runner.run(&restore).await?;
        if !output.success() {
            warn!(
                "pg_restore exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            );
        }

        Ok(())
    }

    async fn copy_into_container(&self, local: &Path, remote: &str) -> Result<(), UpgradeError> {
        let cp = Invocation::docker()
            .arg("cp")
            .arg(local.to_string_lossy())
            .arg(format!("{}:{remote}", self.settings.container));
        self.runner.run(&cp).await?.checked(&cp)?;
        Ok(())
    }

    /// Moves the zip's `filestore/` into `output/filestore`, which the
    /// upgrade container mounts. A missing or uncopyable filestore only
    /// costs attachments, so it is not fatal.
    fn copy_filestore(&self) {
        let src = self.workspace.source_dir().join("filestore");
        if !src.exists() {
            return;
        }

        let dest = self.workspace.filestore_dir();
        if let Err(err) = copy_dir_all(src.as_std_path(), dest.as_std_path()) {
            warn!("Failed to copy filestore: {err}");
            return;
        }

        if let Err(err) = set_mode_recursive(dest.as_std_path(), 0o777) {
            warn!("Failed to set filestore permissions: {err}");
        }
    }

    /// The series recorded in the database, as raw text.
    pub async fn current_version(&self) -> Result<Option<String>, UpgradeError> {
        for query in VERSION_QUERIES {
            let select = self.psql().args(["-t", "-A", "-c", query]);

            let output = match self.runner.run(&select).await {
                Ok(output) => output,
                Err(err) => {
                    warn!("Version query failed: {err}");
                    continue;
                }
            };

            if let Some(version) = output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
            {
                return Ok(Some(version.to_owned()));
            }
        }

        Ok(None)
    }

    /// Plain-SQL `pg_dump` of the upgraded database into `dest`.
    pub async fn dump_to(&self, dest: &Path) -> Result<(), UpgradeError> {
        let dump = self
            .exec()
            .args(["pg_dump", "-U"])
            .arg(&self.settings.user)
            .arg(&self.settings.name);

        self.runner.run_to_file(&dump, dest).await?.checked(&dump)?;
        Ok(())
    }

    /// Stops the service and drops its volume.
    pub async fn teardown(&self) {
        let compose_file = self.workspace.db_compose_file();
        if !compose_file.exists() {
            return;
        }

        let down = self.compose.file(compose_file.as_std_path(), ["down", "-v"]);
        match self.runner.run(&down).await {
            Ok(output) if !output.success() => {
                warn!("Could not stop the database service: {}", output.stderr.trim());
            }
            Err(err) => warn!("Could not stop the database service: {err}"),
            Ok(_) => {}
        }
    }
}

/// `dump.sql` when present, else the first `*.sql` by name.
fn locate_sql_dump(source_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let preferred = source_dir.join("dump.sql");
    if preferred.exists() {
        return Ok(Some(preferred));
    }

    let mut candidates: Vec<PathBuf> = fs_err::read_dir(source_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    candidates.sort();

    Ok(candidates.into_iter().next())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::{Output, testing::ScriptedRunner};
    use pretty_assertions::assert_eq;

    struct Fixture {
        _dir: tempfile::TempDir,
        workspace: Workspace,
        compose: Compose,
        settings: DatabaseSettings,
        upgrade: UpgradeSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
            let workspace = Workspace::new(root);
            workspace.prepare().unwrap();

            let upgrade = UpgradeSettings {
                wait_retries: 3,
                wait_interval_secs: 0,
                ..UpgradeSettings::default()
            };

            Self {
                _dir: dir,
                workspace,
                compose: Compose::plugin(),
                settings: DatabaseSettings::default(),
                upgrade,
            }
        }

        fn database<'a>(&'a self, runner: &'a ScriptedRunner) -> Database<'a, ScriptedRunner> {
            Database::new(
                runner,
                &self.compose,
                &self.settings,
                &self.upgrade,
                &self.workspace,
            )
        }
    }

    #[tokio::test]
    async fn first_non_empty_query_wins() {
        let fx = Fixture::new();
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.contains("ir_config_parameter") {
                Output::ok("15.0.1.3\n")
            } else {
                Output::ok("\n")
            }
        });

        let version = fx.database(&runner).current_version().await.unwrap();

        assert_eq!(version.as_deref(), Some("15.0.1.3"));
        assert_eq!(runner.calls_matching("psql"), 2);
    }

    #[tokio::test]
    async fn no_version_anywhere() {
        let fx = Fixture::new();
        let runner = ScriptedRunner::new(|_| Output::failed("relation does not exist"));

        assert_eq!(fx.database(&runner).current_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn readiness_gives_up() {
        let fx = Fixture::new();
        let runner = ScriptedRunner::new(|_| Output::failed("no response"));

        let err = fx.database(&runner).wait_ready().await.unwrap_err();

        assert!(matches!(err, UpgradeError::DatabaseNotReady(3)));
        assert_eq!(runner.calls_matching("pg_isready"), 3);
    }

    #[tokio::test]
    async fn zip_restore_uses_first_sql_file_and_filestore() {
        let fx = Fixture::new();
        let source = fx.workspace.source_dir();
        std::fs::write(source.join("b.sql"), "-- b").unwrap();
        std::fs::write(source.join("a.sql"), "-- a").unwrap();
        std::fs::create_dir_all(source.join("filestore/3f")).unwrap();
        std::fs::write(source.join("filestore/3f/3fab"), "bin").unwrap();
        let runner = ScriptedRunner::new(|_| Output::ok(""));

        fx.database(&runner).restore(SourceKind::Zip).await.unwrap();

        let calls = runner.calls();
        assert!(calls.iter().any(|c| c.starts_with("docker cp") && c.contains("a.sql")));
        assert!(calls.iter().any(|c| c.contains("psql") && c.ends_with("-f /tmp/dump.sql")));
        assert!(fx.workspace.filestore_dir().join("3f/3fab").exists());
    }

    #[tokio::test]
    async fn zip_without_sql_is_rejected() {
        let fx = Fixture::new();
        let runner = ScriptedRunner::new(|_| Output::ok(""));

        let err = fx.database(&runner).restore(SourceKind::Zip).await.unwrap_err();

        assert!(matches!(err, UpgradeError::MissingDump));
    }

    #[tokio::test]
    async fn pg_restore_warnings_are_tolerated() {
        let fx = Fixture::new();
        std::fs::write(fx.workspace.source_dir().join(STAGED_DUMP_FILE), "PGDMP").unwrap();
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.contains("pg_restore") {
                Output::failed("role \"admin\" does not exist")
            } else {
                Output::ok("")
            }
        });

        fx.database(&runner).restore(SourceKind::Dump).await.unwrap();

        assert_eq!(runner.calls_matching("--single-transaction"), 1);
    }

    #[tokio::test]
    async fn teardown_skips_without_compose_file() {
        let fx = Fixture::new();
        let runner = ScriptedRunner::new(|_| Output::ok(""));

        fx.database(&runner).teardown().await;

        assert!(runner.calls().is_empty());
    }
}
