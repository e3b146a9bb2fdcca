use std::time::Duration;

use camino::Utf8Path;
use secrecy::SecretString;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

pub const CONFIG_DIR: &str = "configuration";
pub const ENV_PREFIX: &str = "ODOO_UPGRADER";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub upgrade: UpgradeSettings,
}

/// The throwaway PostgreSQL service the backup is restored into.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseSettings {
    pub postgres_version: String,
    pub user: String,
    pub password: SecretString,
    /// Database created by the image itself, used for readiness probes.
    pub maintenance_db: String,
    /// Database the backup is restored into and upgraded in place.
    pub name: String,
    pub container: String,
    pub network: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            postgres_version: "13".to_owned(),
            user: "odoo".to_owned(),
            password: SecretString::from("odoo".to_owned()),
            maintenance_db: "odoo".to_owned(),
            name: "database".to_owned(),
            container: "db-odooupgrade".to_owned(),
            network: "odooupgrade-connection".to_owned(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UpgradeSettings {
    pub container: String,
    pub image: String,
    pub openupgrade_repo: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub wait_retries: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub wait_interval_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub download_timeout_secs: u64,
}

impl UpgradeSettings {
    #[must_use]
    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            container: "odoo-openupgrade".to_owned(),
            image: "odoo-openupgrade".to_owned(),
            openupgrade_repo: "https://github.com/OCA/OpenUpgrade.git".to_owned(),
            wait_retries: 30,
            wait_interval_secs: 2,
            request_timeout_secs: 30,
            download_timeout_secs: 60,
        }
    }
}

/// Loads `configuration/config.*` below `base_path` when present, then
/// `ODOO_UPGRADER__SECTION__KEY` environment variables. Missing keys keep
/// their defaults.
pub fn get_configuration<P: AsRef<Utf8Path>>(
    base_path: P,
) -> Result<Settings, config::ConfigError> {
    let config_dir = base_path.as_ref().join(CONFIG_DIR);

    let settings = config::Config::builder()
        .add_source(config::File::with_name(config_dir.join("config").as_str()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let settings = get_configuration(&root).unwrap();

        assert_eq!(settings.database.postgres_version, "13");
        assert_eq!(settings.database.password.expose_secret(), "odoo");
        assert_eq!(settings.upgrade.wait_retries, 30);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join(CONFIG_DIR)).unwrap();
        std::fs::write(
            root.join(CONFIG_DIR).join("config.yml"),
            "database:\n  postgres_version: \"15\"\nupgrade:\n  wait_retries: \"5\"\n",
        )
        .unwrap();

        let settings = get_configuration(&root).unwrap();

        assert_eq!(settings.database.postgres_version, "15");
        assert_eq!(settings.database.container, "db-odooupgrade");
        assert_eq!(settings.upgrade.wait_retries, 5);
        assert_eq!(settings.upgrade.download_timeout_secs, 60);
    }
}
