use std::{
    fs::OpenOptions,
    io::{BufRead as _, BufReader, Write},
    path::Path,
};

use config::ConfigError;

use crate::CliError;

const CONFIG_TEMPLATE: &str = r#"# OdooUpgrader configuration
# Every key is optional. Environment variables override this file,
# e.g. ODOO_UPGRADER__DATABASE__POSTGRES_VERSION=15
database:
  postgres_version: "13"
  user: "odoo"
  password: "odoo"
  maintenance_db: "odoo"
  name: "database"
  container: "db-odooupgrade"
  network: "odooupgrade-connection"
upgrade:
  container: "odoo-openupgrade"
  image: "odoo-openupgrade"
  openupgrade_repo: "https://github.com/OCA/OpenUpgrade.git"
  wait_retries: "30"
  wait_interval_secs: "2"
  request_timeout_secs: "30"
  download_timeout_secs: "60"
"#;

const CONFIG_PATH: &str = "configuration/config.yml";
const GITIGNORE_PATH: &str = ".gitignore";
const CONFIG_ENTRY: &str = "/configuration";

/// Writes the configuration template below `base`.
pub fn create_config_template(base: &Path) -> Result<(), CliError> {
    let config_path = base.join(CONFIG_PATH);
    let gitignore_path = base.join(GITIGNORE_PATH);

    let is_git_repo = base.join(".git").exists();

    if config_path.exists() && !fs_err::read_to_string(&config_path)?.trim().is_empty() {
        return Err(ConfigError::Message(
            "Config file already exists and is not empty. Please remove or rename the existing config.yml file.".to_string()
        ).into());
    }

    fs_err::create_dir_all(base.join("configuration"))?;
    fs_err::write(&config_path, CONFIG_TEMPLATE)?;

    if is_git_repo {
        if gitignore_path.exists() {
            let reader = BufReader::new(fs_err::File::open(&gitignore_path)?);
            let mut found_config_entry = false;

            for line in reader.lines() {
                if line?.trim() == CONFIG_ENTRY {
                    found_config_entry = true;
                    break;
                }
            }

            if found_config_entry {
                println!("ℹ️  /configuration already exists in .gitignore");
            } else {
                let contents = fs_err::read_to_string(&gitignore_path)?;
                let mut gitignore_file = OpenOptions::new().append(true).open(&gitignore_path)?;

                if !contents.ends_with('\n') && !contents.is_empty() {
                    writeln!(gitignore_file)?;
                }

                writeln!(gitignore_file, "{CONFIG_ENTRY}")?;
                println!("✅ Added /configuration to existing .gitignore");
            }
        } else {
            fs_err::write(&gitignore_path, format!("{CONFIG_ENTRY}\n"))?;
            println!("✅ Created .gitignore with /configuration entry");
        }
    } else {
        println!("ℹ️  Not a Git repository - skipping .gitignore creation");
    }

    println!("✅ config.yml created successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use odoo_upgrader_common::get_configuration;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn template_loads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        create_config_template(dir.path()).unwrap();

        let base = Utf8Path::from_path(dir.path()).unwrap();
        let settings = get_configuration(base).unwrap();

        assert_eq!(settings.database.container, "db-odooupgrade");
        assert_eq!(settings.upgrade.wait_retries, 30);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("configuration")).unwrap();
        std::fs::write(dir.path().join(CONFIG_PATH), "database: {}\n").unwrap();

        let err = create_config_template(dir.path()).unwrap_err();

        assert!(matches!(err, CliError::ConfigError(_)));
    }

    #[test]
    fn gitignore_entry_is_added_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(GITIGNORE_PATH), "target").unwrap();

        create_config_template(dir.path()).unwrap();
        std::fs::write(dir.path().join(CONFIG_PATH), "").unwrap();
        create_config_template(dir.path()).unwrap();

        let gitignore = std::fs::read_to_string(dir.path().join(GITIGNORE_PATH)).unwrap();
        assert_eq!(gitignore, "target\n/configuration\n");
    }
}
