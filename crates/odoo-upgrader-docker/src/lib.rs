mod database;
mod runner;
mod step;
mod templates;
mod upgrader;

#[cfg(test)]
mod testing;

pub use database::*;
pub use runner::*;
pub use templates::*;
pub use upgrader::*;

use std::path::PathBuf;

use odoo_upgrader_common::{CommonError, MINIMUM_VERSION, OdooVersion};
use odoo_upgrader_fetch::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("Docker is not available: {0}")]
    DockerUnavailable(String),
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` {}", describe_exit(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Source URL {url} is not accessible: {source}")]
    SourceUnreachable { url: String, source: FetchError },
    #[error("Extra addons path not found: {}", .0.display())]
    AddonsNotFound(PathBuf),
    #[error("Extra addons URL {url} is not accessible: {source}")]
    AddonsUnreachable { url: String, source: FetchError },
    #[error("Database failed to start after {0} attempts")]
    DatabaseNotReady(u32),
    #[error("No dump.sql found inside ZIP")]
    MissingDump,
    #[error("Could not determine database version")]
    UnknownVersion,
    #[error("Source database version {0} is below {min}. Not supported", min = MINIMUM_VERSION)]
    UnsupportedSource(OdooVersion),
    #[error("Upgrade to {version} failed: container {}", describe_exit(.code))]
    StepFailed {
        version: OdooVersion,
        code: Option<i32>,
    },
    #[error("Upgrade to {expected} finished but the database {}", describe_found(.found))]
    NoProgress {
        expected: OdooVersion,
        found: Option<OdooVersion>,
    },
    #[error("Operation cancelled by user")]
    Cancelled,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "did not report an exit status".to_owned(),
    }
}

fn describe_found(found: &Option<OdooVersion>) -> String {
    match found {
        Some(version) => format!("still reports {version}"),
        None => "no longer reports a version".to_owned(),
    }
}
