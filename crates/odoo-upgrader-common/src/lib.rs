pub mod configuration;
mod location;
pub mod report;
mod version;
mod workspace;

pub use configuration::{DatabaseSettings, Settings, UpgradeSettings, get_configuration};
pub use location::*;
pub use version::*;
pub use workspace::*;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("'{0}' is not a valid Odoo version")]
    InvalidVersion(String),
    #[error(
        "{0} is not a supported target version. Supported: {supported}",
        supported = SUPPORTED_VERSIONS.join(", ")
    )]
    UnsupportedTarget(String),
    #[error("Invalid protocol in '{0}'. Only http/https are supported")]
    InvalidProtocol(String),
    #[error("'{input}' is not a valid URL: {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error("Working directory is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
