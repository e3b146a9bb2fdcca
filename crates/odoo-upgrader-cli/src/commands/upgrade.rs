use std::{path::Path, time::Instant};

use odoo_upgrader_common::{
    Location, MINIMUM_VERSION, OdooVersion, Settings, SourceKind, Workspace, report, upgrade_path,
};
use odoo_upgrader_docker::{SystemRunner, UpgradeOptions, Upgrader, detect_compose};
use odoo_upgrader_fetch::Fetcher;
use tracing::info;

use crate::CliError;

/// The `upgrade` flags, still as typed by the user.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub source: String,
    pub version: String,
    pub extra_addons: Option<String>,
    pub verbose: bool,
    pub postgres_version: Option<String>,
    pub dry_run: bool,
}

impl UpgradeRequest {
    pub fn options(&self) -> Result<UpgradeOptions, CliError> {
        Ok(UpgradeOptions {
            source: Location::parse(&self.source)?,
            target: OdooVersion::parse_target(&self.version)?,
            extra_addons: self
                .extra_addons
                .as_deref()
                .map(Location::parse)
                .transpose()?,
            verbose: self.verbose,
        })
    }

    /// Flags win over the configuration file.
    #[must_use]
    pub fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(postgres_version) = &self.postgres_version {
            settings.database.postgres_version.clone_from(postgres_version);
        }
        settings
    }
}

pub fn handle(request: &UpgradeRequest, settings: Settings) -> Result<(), CliError> {
    let options = request.options()?;
    let settings = request.apply_overrides(settings);
    let workspace = Workspace::current()?;
    let fetcher = Fetcher::new(&settings.upgrade)?;

    report::banner(&format!("Upgrading to Odoo {}", options.target));
    for line in summary(&options, &settings) {
        report::detail(&line);
    }

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let runner = SystemRunner;
        let compose = detect_compose(&runner).await;
        info!("Using compose command: {compose}");

        let dry_run = request.dry_run;
        let upgrader = Upgrader::new(runner, compose, fetcher, settings, workspace, options);

        if dry_run {
            upgrader.validate().await?;
            report::success("Dry run: inputs are valid, no containers were started.");
            return Ok(());
        }

        let start = Instant::now();
        let package = upgrader.execute().await?;

        eprintln!(
            "\n🎉 Upgrade finished! took {} s. Package: {package}\n",
            start.elapsed().as_secs()
        );
        Ok::<_, CliError>(())
    })
}

/// Pre-flight lines describing what is about to happen.
pub(crate) fn summary(options: &UpgradeOptions, settings: &Settings) -> Vec<String> {
    let kind = match &options.source {
        Location::Remote(_) => SourceKind::detect(Path::new(&options.source.file_name())),
        Location::Local(path) => SourceKind::detect(path),
    };

    let mut lines = vec![
        format!("Source: {} ({kind})", options.source),
        format!("Target: {}", options.target),
        format!("PostgreSQL: {}", settings.database.postgres_version),
    ];

    if let Some(addons) = &options.extra_addons {
        lines.push(format!("Extra addons: {addons}"));
    }

    let ladder = upgrade_path(MINIMUM_VERSION, options.target)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if !ladder.is_empty() {
        lines.push(format!(
            "Steps run one after the other from the detected version: {}",
            ladder.join(" → ")
        ));
    }

    lines
}
