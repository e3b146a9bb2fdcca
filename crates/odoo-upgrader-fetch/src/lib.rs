mod addons;
mod archive;
mod http;

pub use addons::*;
pub use archive::*;
pub use http::*;

use std::path::PathBuf;

use odoo_upgrader_common::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Download of {url} stalled for more than {secs} s")]
    Stalled { url: String, secs: u64 },
    #[error("{} is not a valid zip archive: {source}", path.display())]
    InvalidArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("Archive entry '{0}' points outside of the extraction directory")]
    UnsafeEntry(String),
    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("{} is neither a directory nor a .zip file", .0.display())]
    UnsupportedAddons(PathBuf),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
