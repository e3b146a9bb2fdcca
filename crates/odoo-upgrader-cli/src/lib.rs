mod clierror;
pub mod commands;

pub use clierror::*;
pub use odoo_upgrader_common::get_configuration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum, builder::PossibleValuesParser, command};
use odoo_upgrader_common::SUPPORTED_VERSIONS;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, before_help = r"
  ___      _            _   _                         _
 / _ \  __| | ___   ___| | | |_ __  __ _ _ __ __ _ __| | ___ _ __
| | | |/ _` |/ _ \ / _ \ | | | '_ \/ _` | '__/ _` / _` |/ _ \ '__|
| |_| | (_| | (_) | (_) | |_| | |_) | (_| | | | (_| | (_| |  __/ |
 \___/ \__,_|\___/ \___/ \___/| .__/\__, |_|  \__,_|\__,_|\___|_|
                              |_|   |___/")]
pub struct Cli {
    #[arg(long = "log-level", default_value = "INFO", global = true)]
    pub loglevel: String,

    /// Additionally writes the logs, without colors, to this file.
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// `--verbose` on `upgrade` forces debug output regardless of
    /// `--log-level`.
    #[must_use]
    pub fn log_filter(&self) -> String {
        match self.command {
            Command::Upgrade { verbose: true, .. } => "debug".to_owned(),
            _ => self.loglevel.to_lowercase(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upgrades a database backup to the target Odoo version using OpenUpgrade.
    Upgrade {
        /// Local .zip/.dump file or http(s) URL of the backup.
        #[arg(short, long)]
        source: String,

        /// Target Odoo version.
        #[arg(short = 't', long, value_parser = PossibleValuesParser::new(SUPPORTED_VERSIONS))]
        version: String,

        /// Custom addons: a local folder, a local .zip file or the URL of a .zip file.
        #[arg(short, long)]
        extra_addons: Option<String>,

        /// Streams the OpenUpgrade container output and enables debug logs.
        #[arg(long, default_value = "false")]
        verbose: bool,

        /// PostgreSQL image tag for the database container. Overrides the configuration file.
        #[arg(short = 'P', long)]
        postgres_version: Option<String>,

        /// Only validates the inputs and prints the steps that would run.
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },
    /// Prints the supported target versions.
    Versions {
        #[arg(value_enum, short, long, default_value_t = Format::Pretty)]
        format: Format,
    },
    /// Prints the intermediate versions an upgrade between two versions goes through.
    Plan {
        /// Version the database is currently at, e.g. 14.0.
        #[arg(short, long)]
        from: String,

        /// Target Odoo version.
        #[arg(short, long, value_parser = PossibleValuesParser::new(SUPPORTED_VERSIONS))]
        to: String,
    },
    /// Creates a `configuration/config.yml` template.
    Init,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}
