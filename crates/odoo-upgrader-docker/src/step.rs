use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indicatif::{ProgressBar, ProgressStyle};
use odoo_upgrader_common::{OdooVersion, report};
use odoo_upgrader_fetch::module_names;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    Invocation, Runner, UpgradeError, Upgrader, render_dockerfile, render_upgrade_compose,
    write_template,
};

const BUILD_STAMP: &str = ".build_timestamp";

impl<R: Runner> Upgrader<R> {
    /// Builds the OpenUpgrade image for `version` and runs it once against
    /// the restored database.
    #[instrument(skip(self))]
    pub(crate) async fn run_step(
        &self,
        version: OdooVersion,
        is_final: bool,
    ) -> Result<(), UpgradeError> {
        info!("Preparing upgrade step to version {version}");

        let with_addons = self.options.extra_addons.is_some();
        let mut modules = vec![];

        if with_addons {
            let addons_dir = self.workspace.custom_addons_dir();

            // A fresh file in the build context defeats the layer cache so
            // the COPY of the addons always reruns.
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            fs_err::write(addons_dir.join(BUILD_STAMP), stamp.to_string())?;

            if is_final {
                info!("Target version reached. Injecting custom addons path and modules.");
                modules = module_names(addons_dir.as_std_path())?;
            } else {
                info!("Intermediate version. Skipping custom addons loading.");
            }
        }

        let upgrade = &self.settings.upgrade;
        let compose_file = self.workspace.upgrade_compose_file();

        write_template(
            self.workspace.dockerfile().as_std_path(),
            &render_dockerfile(version, upgrade, with_addons),
        )?;
        write_template(
            compose_file.as_std_path(),
            &render_upgrade_compose(
                &self.settings.database,
                upgrade,
                with_addons && is_final,
                &modules,
            ),
        )?;

        let rm = Invocation::docker().args(["rm", "-f"]).arg(&upgrade.container);
        if let Err(err) = self.runner.run(&rm).await {
            debug!("Ignoring failed container removal: {err}");
        }

        let up = self.compose.file(
            compose_file.as_std_path(),
            ["up", "--build", "--abort-on-container-exit"],
        );

        let pb = spinner(&format!("Upgrading to {version}..."));
        let verbose = self.options.verbose;
        let output = self
            .runner
            .stream(&up, |line| {
                if verbose {
                    pb.suspend(|| report::detail(line));
                }
                debug!("{line}");
            })
            .await;
        pb.finish_and_clear();
        let output = output?;

        let stderr = output.stderr.trim();
        if !output.success() {
            if !stderr.is_empty() {
                error!("Container Error Stream: {stderr}");
            }
            report::failure("Upgrade process failed.");
            error!("Upgrade process returned non-zero exit code.");
            if !verbose && !stderr.is_empty() {
                eprintln!("{stderr}");
            }
            return Err(UpgradeError::StepFailed {
                version,
                code: output.code,
            });
        }
        if !stderr.is_empty() {
            debug!("Container Error Stream: {stderr}");
        }

        let exit_code = self.container_exit_code(version).await?;
        info!("Container exit code: {exit_code}");

        if exit_code != 0 {
            report::failure(&format!("Container exited with code {exit_code}"));
            return Err(UpgradeError::StepFailed {
                version,
                code: Some(exit_code),
            });
        }

        report::success(&format!("Upgrade to {version} successful."));

        let down = self.compose.file(compose_file.as_std_path(), ["down"]);
        match self.runner.run(&down).await {
            Ok(out) if !out.success() => warn!("compose down failed: {}", out.stderr.trim()),
            Err(err) => warn!("compose down failed: {err}"),
            Ok(_) => {}
        }

        Ok(())
    }

    /// `compose up` can succeed while Odoo itself failed; the container's
    /// own status is authoritative.
    async fn container_exit_code(&self, version: OdooVersion) -> Result<i32, UpgradeError> {
        let inspect = Invocation::docker()
            .arg("inspect")
            .arg(&self.settings.upgrade.container)
            .arg("--format={{.State.ExitCode}}");

        let output = self.runner.run(&inspect).await?.checked(&inspect)?;

        output.stdout.trim().parse().map_err(|err| {
            error!("Error checking exit code: {err}");
            UpgradeError::StepFailed {
                version,
                code: None,
            }
        })
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.magenta} {msg} {elapsed}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");

    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_owned());
    pb
}
