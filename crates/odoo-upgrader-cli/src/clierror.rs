use odoo_upgrader_common::{CommonError, MINIMUM_VERSION, SUPPORTED_VERSIONS};
use odoo_upgrader_docker::UpgradeError;
use odoo_upgrader_fetch::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("{0}")]
    InvalidInput(#[from] CommonError),
    #[error("{0}")]
    UpgradeError(#[from] UpgradeError),
    #[error("{0}")]
    FetchError(#[from] FetchError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not serialize output: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("Other: {0}")]
    Other(#[from] eyre::Report),
}

impl CliError {
    pub fn print_tip(&self) {
        match self {
            CliError::ConfigError(error) => {
                eprintln!("⚙️  Configuration error occurred:");
                eprintln!("   • Error details: {error}");
                eprintln!("   • Check that configuration/config.yml is valid YAML");
                eprintln!("   • Environment overrides use the form ODOO_UPGRADER__DATABASE__USER");
            }
            CliError::InvalidInput(error) => {
                eprintln!("💡 Invalid input:");
                match error {
                    CommonError::InvalidVersion(_) | CommonError::UnsupportedTarget(_) => {
                        eprintln!("   • Supported versions: {}", SUPPORTED_VERSIONS.join(", "));
                    }
                    CommonError::InvalidProtocol(_) | CommonError::InvalidUrl { .. } => {
                        eprintln!("   • Sources are local paths or http(s):// URLs");
                    }
                    CommonError::NonUtf8Path(_) => {
                        eprintln!("   • Run the tool from a directory whose path is valid UTF-8");
                    }
                    CommonError::Io(error) => {
                        eprintln!("   • File system error: {error}");
                    }
                }
            }
            CliError::UpgradeError(error) => print_upgrade_tip(error),
            CliError::FetchError(error) => print_fetch_tip(error),
            CliError::IoError(error) => {
                eprintln!("💡 File system error:");
                match error.kind() {
                    std::io::ErrorKind::NotFound => {
                        eprintln!("   • File or directory not found");
                    }
                    std::io::ErrorKind::PermissionDenied => {
                        eprintln!("   • Permission denied - check file permissions");
                        eprintln!(
                            "   • Files written by containers may belong to root; remove output/ with sudo"
                        );
                    }
                    _ => {
                        eprintln!("   • File system error: {error}");
                    }
                }
            }
            CliError::SerializeError(error) => {
                eprintln!("💡 Output could not be rendered:");
                eprintln!("   • Error details: {error}");
            }
            CliError::Other(error) => {
                eprintln!("💡 Unexpected error occurred:");
                eprintln!("   • Error details: {error}");
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigError(_) => 10,
            CliError::InvalidInput(_) => 11,
            CliError::UpgradeError(error) => upgrade_exit_code(error),
            CliError::FetchError(_) => 13,
            CliError::IoError(_) | CliError::SerializeError(_) | CliError::Other(_) => 99,
        }
    }

    pub fn exit_with_tips(self) -> ! {
        eprintln!("❌ {self}");
        self.print_tip();
        std::process::exit(self.exit_code());
    }
}

fn upgrade_exit_code(error: &UpgradeError) -> i32 {
    match error {
        UpgradeError::SourceNotFound(_)
        | UpgradeError::AddonsNotFound(_)
        | UpgradeError::MissingDump
        | UpgradeError::UnknownVersion
        | UpgradeError::UnsupportedSource(_)
        | UpgradeError::Common(_) => 11,
        UpgradeError::DockerUnavailable(_)
        | UpgradeError::Spawn { .. }
        | UpgradeError::CommandFailed { .. }
        | UpgradeError::DatabaseNotReady(_) => 12,
        UpgradeError::SourceUnreachable { .. }
        | UpgradeError::AddonsUnreachable { .. }
        | UpgradeError::Fetch(_) => 13,
        UpgradeError::StepFailed { .. } | UpgradeError::NoProgress { .. } => 14,
        UpgradeError::Cancelled => 130,
        UpgradeError::Io(_) => 99,
    }
}

fn print_upgrade_tip(error: &UpgradeError) {
    match error {
        UpgradeError::DockerUnavailable(_) | UpgradeError::Spawn { .. } => {
            eprintln!("🐳 Docker is required:");
            eprintln!("   • Make sure the Docker daemon is running (`docker info`)");
            eprintln!("   • Your user needs access to the Docker socket");
        }
        UpgradeError::CommandFailed { command, stderr, .. } => {
            eprintln!("🐳 A Docker command failed:");
            eprintln!("   • Command: {command}");
            for line in stderr.lines().filter(|l| !l.trim().is_empty()).take(5) {
                eprintln!("   • {}", line.trim());
            }
        }
        UpgradeError::DatabaseNotReady(_) => {
            eprintln!("🐳 PostgreSQL did not become ready:");
            eprintln!("   • Inspect the container with `docker logs db-odooupgrade`");
            eprintln!("   • Raise upgrade.wait_retries in the configuration for slow machines");
        }
        UpgradeError::SourceNotFound(_) | UpgradeError::AddonsNotFound(_) => {
            eprintln!("💡 Check the path:");
            eprintln!("   • Relative paths are resolved from the current directory");
        }
        UpgradeError::SourceUnreachable { .. } | UpgradeError::AddonsUnreachable { .. } => {
            eprintln!("🌐 The URL could not be reached:");
            eprintln!("   • Verify the link is public and does not require a login");
        }
        UpgradeError::Fetch(error) => print_fetch_tip(error),
        UpgradeError::MissingDump => {
            eprintln!("💡 The ZIP must contain a plain SQL dump:");
            eprintln!("   • Odoo backups (database manager) ship it as dump.sql at the root");
        }
        UpgradeError::UnknownVersion => {
            eprintln!("💡 The restored database does not look like an Odoo database:");
            eprintln!("   • ir_module_module has no version for the base module");
        }
        UpgradeError::UnsupportedSource(_) => {
            eprintln!("💡 OpenUpgrade only covers {MINIMUM_VERSION} and later");
        }
        UpgradeError::StepFailed { .. } | UpgradeError::NoProgress { .. } => {
            eprintln!("💡 OpenUpgrade could not migrate the database:");
            eprintln!("   • Rerun with --verbose to see the container output");
            eprintln!("   • Use --log-file to keep the full log");
            eprintln!("   • Uninstall modules without an OpenUpgrade migration before retrying");
        }
        UpgradeError::Cancelled => {
            eprintln!("💡 The Docker environment was cleaned up");
        }
        UpgradeError::Common(error) => {
            eprintln!("💡 Unexpected value: {error}");
        }
        UpgradeError::Io(error) => {
            eprintln!("💡 File system error: {error}");
        }
    }
}

fn print_fetch_tip(error: &FetchError) {
    match error {
        FetchError::Request(_) | FetchError::Status { .. } | FetchError::Stalled { .. } => {
            eprintln!("🌐 Download failed:");
            eprintln!("   • Check your network connection and the URL");
            eprintln!("   • Slow servers may need a higher upgrade.download_timeout_secs");
        }
        FetchError::InvalidArchive { .. } | FetchError::Archive(_) => {
            eprintln!("💡 The archive could not be read:");
            eprintln!("   • Make sure the file is a complete, valid ZIP");
        }
        FetchError::UnsafeEntry(_) => {
            eprintln!("💡 The archive contains paths escaping the extraction directory");
        }
        FetchError::UnsupportedAddons(_) => {
            eprintln!("💡 Extra addons must be a folder, a .zip file or a URL to a .zip file");
        }
        FetchError::Common(error) => {
            eprintln!("💡 Unexpected value: {error}");
        }
        FetchError::Io(error) => {
            eprintln!("💡 File system error: {error}");
        }
    }
}
