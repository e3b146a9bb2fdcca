use camino::Utf8Path;
use color_eyre::owo_colors::OwoColorize;
use eyre::{WrapErr, eyre};
use std::fmt;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt::Layer, layer::SubscriberExt};

/// Console logs on stderr, plus an uncolored copy in `log_file` when given.
///
/// `RUST_LOG` takes precedence over `env_filter`. The returned guard flushes
/// the file writer when dropped and must outlive every log call.
pub fn get_subscriber(
    env_filter: &str,
    log_file: Option<&Utf8Path>,
) -> eyre::Result<(impl Subscriber + Send + Sync, Option<WorkerGuard>)> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = Layer::new()
                .with_ansi(false)
                .with_timer(UpgraderTimer::plain())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(
            Layer::new()
                .compact()
                .with_ansi(true)
                .with_timer(UpgraderTimer::new())
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .with(ErrorLayer::default());

    Ok((subscriber, guard))
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> eyre::Result<()> {
    LogTracer::init().wrap_err("Failed to set logger")?;
    tracing::subscriber::set_global_default(subscriber).wrap_err("Failed to set subscriber")?;
    Ok(())
}

fn file_appender(path: &Utf8Path) -> eyre::Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("--log-file must name a file, got {path}"))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    fs_err::create_dir_all(dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .wrap_err_with(|| format!("Could not open log file {path}"))
}

struct UpgraderTimer {
    ansi: bool,
}

impl UpgraderTimer {
    pub fn new() -> Self {
        Self { ansi: true }
    }

    pub fn plain() -> Self {
        Self { ansi: false }
    }
}

impl Default for UpgraderTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl tracing_subscriber::fmt::time::FormatTime for UpgraderTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        if self.ansi {
            let datetime = chrono::Local::now().format("%H:%M:%S");
            write!(w, "{}", datetime.bright_blue())
        } else {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
        }
    }
}
