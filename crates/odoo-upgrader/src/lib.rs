pub mod telemetry;

use std::path::Path;

use camino::Utf8Path;
use odoo_upgrader_cli::{
    Cli, CliError, Command,
    commands::{self, upgrade::UpgradeRequest},
    get_configuration,
};

/// Dispatches the parsed command. Errors are returned, never turned into
/// an exit here, so the caller can flush the log file first.
pub fn run_cli(cli: &Cli) -> Result<(), CliError> {
    match cli.command() {
        Command::Init => commands::configuration::create_config_template(Path::new(".")),
        Command::Versions { format } => commands::versions::handle(format),
        Command::Plan { from, to } => commands::plan::handle(from, to),
        Command::Upgrade {
            source,
            version,
            extra_addons,
            verbose,
            postgres_version,
            dry_run,
        } => {
            let request = UpgradeRequest {
                source: source.clone(),
                version: version.clone(),
                extra_addons: extra_addons.clone(),
                verbose: *verbose,
                postgres_version: postgres_version.clone(),
                dry_run: *dry_run,
            };
            let settings = get_configuration(Utf8Path::new("."))?;

            commands::upgrade::handle(&request, settings)
        }
    }
}
