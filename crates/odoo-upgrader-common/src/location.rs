use std::{fmt, path::PathBuf};

use url::Url;

use crate::CommonError;

const FALLBACK_DOWNLOAD_NAME: &str = "downloaded_db.dump";

/// Where a database backup or an addons bundle comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl Location {
    pub fn parse(input: &str) -> Result<Self, CommonError> {
        let input = input.trim();

        if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input).map_err(|err| CommonError::InvalidUrl {
                input: input.to_owned(),
                reason: err.to_string(),
            })?;
            return Ok(Self::Remote(url));
        }

        if input.contains("://") {
            return Err(CommonError::InvalidProtocol(input.to_owned()));
        }

        Ok(Self::Local(PathBuf::from(input)))
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The file name a remote backup is saved under: the last path segment,
    /// or a generic dump name when the URL has none.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map_or_else(|| FALLBACK_DOWNLOAD_NAME.to_owned(), ToOwned::to_owned),
            Self::Local(path) => path
                .file_name()
                .map_or_else(
                    || FALLBACK_DOWNLOAD_NAME.to_owned(),
                    |name| name.to_string_lossy().into_owned(),
                ),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The two backup formats Odoo's database manager produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A zip holding `dump.sql` and, optionally, the `filestore/` tree.
    Zip,
    /// A `pg_dump` custom-format archive.
    Dump,
}

impl SourceKind {
    #[must_use]
    pub fn detect(path: &std::path::Path) -> Self {
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

        if is_zip { Self::Zip } else { Self::Dump }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "ZIP"),
            Self::Dump => write!(f, "DUMP"),
        }
    }
}
