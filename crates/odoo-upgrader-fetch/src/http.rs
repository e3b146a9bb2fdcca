use std::{path::Path, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use odoo_upgrader_common::UpgradeSettings;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use crate::FetchError;

/// HTTP side of the run: reachability checks before any container starts,
/// and the actual backup/addons downloads.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl Fetcher {
    pub fn new(settings: &UpgradeSettings) -> Result<Self, FetchError> {
        let client = reqwest::ClientBuilder::new()
            .deflate(true)
            .gzip(true)
            .connect_timeout(settings.download_timeout())
            .build()?;

        Ok(Self {
            client,
            request_timeout: settings.request_timeout(),
            download_timeout: settings.download_timeout(),
        })
    }

    /// Opens the backup URL and checks the status line; the body is dropped
    /// unread.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn probe_source(&self, url: &Url) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        response.error_for_status()?;
        debug!("source is reachable");

        Ok(())
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn probe_addons(&self, url: &Url) -> Result<(), FetchError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(())
    }

    /// Streams `url` into `dest`, returning the number of bytes written.
    ///
    /// Waiting longer than the download timeout for the response headers
    /// or for any single chunk aborts the transfer; the total duration is
    /// unbounded.
    pub async fn download(&self, url: &Url, dest: &Path, label: &str) -> Result<u64, FetchError> {
        info!("Downloading {url} to {}", dest.display());

        let mut response =
            tokio::time::timeout(self.download_timeout, self.client.get(url.clone()).send())
                .await
                .map_err(|_| self.stalled(url))??
                .error_for_status()?;

        let pb = progress_bar(response.content_length(), label);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::time::timeout(self.download_timeout, response.chunk())
                .await
                .map_err(|_| self.stalled(url))??;

            let Some(chunk) = chunk else {
                break;
            };

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        file.flush().await?;
        pb.finish_and_clear();
        debug!(written, "download finished");

        Ok(written)
    }

    fn stalled(&self, url: &Url) -> FetchError {
        FetchError::Stalled {
            url: url.to_string(),
            secs: self.download_timeout.as_secs(),
        }
    }
}

fn progress_bar(total: Option<u64>, label: &str) -> ProgressBar {
    let pb = match total {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} • {elapsed}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} {msg} {bytes} • {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
            pb.set_style(style);
            pb
        }
    };

    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(label.to_owned());
    pb
}
