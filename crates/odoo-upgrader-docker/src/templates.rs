use std::path::Path;

use odoo_upgrader_common::{DatabaseSettings, OdooVersion, UpgradeSettings};
use secrecy::ExposeSecret;

pub const CUSTOM_ADDONS_MOUNT: &str = "/mnt/custom-addons";
pub const OPENUPGRADE_MOUNT: &str = "/mnt/extra-addons";

/// Compose file for the PostgreSQL service and the network the upgrade
/// containers join.
#[must_use]
pub fn render_db_compose(db: &DatabaseSettings) -> String {
    format!(
        r"
services:
  {container}:
    container_name: {container}
    image: postgres:{postgres_version}
    environment:
      - POSTGRES_DB={maintenance_db}
      - POSTGRES_PASSWORD={password}
      - POSTGRES_USER={user}
    networks:
      - {network}
    volumes:
      - postgres_data:/var/lib/postgresql/data
    restart: unless-stopped

networks:
  {network}:
    driver: bridge
    name: {network}

volumes:
  postgres_data:
",
        container = db.container,
        postgres_version = db.postgres_version,
        maintenance_db = db.maintenance_db,
        password = db.password.expose_secret(),
        user = db.user,
        network = db.network,
    )
}

/// Image for one step: the stock Odoo image of `version` with the matching
/// OpenUpgrade branch cloned in. Custom addons are layered last, their
/// requirements first so pip's layer survives code-only changes.
#[must_use]
pub fn render_dockerfile(
    version: OdooVersion,
    upgrade: &UpgradeSettings,
    with_custom_addons: bool,
) -> String {
    let custom_addons = if with_custom_addons {
        format!(
            r"
RUN mkdir -p {CUSTOM_ADDONS_MOUNT}
COPY --chown=odoo:odoo ./output/custom_addons/requirements.txt {CUSTOM_ADDONS_MOUNT}/requirements.txt
RUN pip3 install --no-cache-dir -r {CUSTOM_ADDONS_MOUNT}/requirements.txt
COPY --chown=odoo:odoo ./output/custom_addons/ {CUSTOM_ADDONS_MOUNT}/
"
        )
    } else {
        String::new()
    };

    format!(
        r"
FROM odoo:{version}
USER root
RUN apt-get update && apt-get install -y git && rm -rf /var/lib/apt/lists/*
RUN git clone {repo} --depth 1 --branch {version} {OPENUPGRADE_MOUNT}
RUN pip3 install --no-cache-dir -r {OPENUPGRADE_MOUNT}/requirements.txt

{custom_addons}

USER odoo
",
        repo = upgrade.openupgrade_repo,
    )
}

/// Compose file running `odoo --update all` once against the restored
/// database with OpenUpgrade's scripts on the upgrade path.
///
/// `custom_modules` is only non-empty on the last step: intermediate
/// series never see the custom code.
#[must_use]
pub fn render_upgrade_compose(
    db: &DatabaseSettings,
    upgrade: &UpgradeSettings,
    custom_addons_path: bool,
    custom_modules: &[String],
) -> String {
    let addons_path = if custom_addons_path {
        format!(",{CUSTOM_ADDONS_MOUNT}")
    } else {
        String::new()
    };

    let modules: String = custom_modules
        .iter()
        .map(|module| format!(",{module}"))
        .collect();

    format!(
        r#"
services:
  {container}:
    image: {image}
    build:
      context: .
      dockerfile: Dockerfile
    container_name: {container}
    environment:
      - HOST={db_container}
      - POSTGRES_USER={user}
      - POSTGRES_PASSWORD={password}
    networks:
      - {network}
    volumes:
      - ./output/filestore:/var/lib/odoo/filestore/{db_name}
      - ./output:/var/log/odoo
    restart: "no"
    entrypoint: /entrypoint.sh
    command: >
      odoo -d {db_name}
      --upgrade-path={OPENUPGRADE_MOUNT}/openupgrade_scripts/scripts
      --addons-path={OPENUPGRADE_MOUNT}{addons_path}
      --update all
      --stop-after-init
      --load=base,web,openupgrade_framework{modules}
      --log-level=info
      --logfile=/var/log/odoo/odoo.log
networks:
  {network}:
    external: true
    name: {network}
"#,
        container = upgrade.container,
        image = upgrade.image,
        db_container = db.container,
        user = db.user,
        password = db.password.expose_secret(),
        network = db.network,
        db_name = db.name,
    )
}

/// Writes a rendered template trimmed, with unix line endings whatever the
/// host platform.
pub fn write_template(path: &Path, content: &str) -> std::io::Result<()> {
    let normalized = content.trim().replace("\r\n", "\n");
    fs_err::write(path, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn db_compose() {
        let rendered = render_db_compose(&DatabaseSettings::default());

        expect![[r#"
            services:
              db-odooupgrade:
                container_name: db-odooupgrade
                image: postgres:13
                environment:
                  - POSTGRES_DB=odoo
                  - POSTGRES_PASSWORD=odoo
                  - POSTGRES_USER=odoo
                networks:
                  - odooupgrade-connection
                volumes:
                  - postgres_data:/var/lib/postgresql/data
                restart: unless-stopped

            networks:
              odooupgrade-connection:
                driver: bridge
                name: odooupgrade-connection

            volumes:
              postgres_data:"#]]
        .assert_eq(rendered.trim());
    }

    #[test]
    fn dockerfile_without_addons() {
        let rendered = render_dockerfile(OdooVersion::new(15, 0), &UpgradeSettings::default(), false);

        expect![[r#"
            FROM odoo:15.0
            USER root
            RUN apt-get update && apt-get install -y git && rm -rf /var/lib/apt/lists/*
            RUN git clone https://github.com/OCA/OpenUpgrade.git --depth 1 --branch 15.0 /mnt/extra-addons
            RUN pip3 install --no-cache-dir -r /mnt/extra-addons/requirements.txt



            USER odoo"#]]
        .assert_eq(rendered.trim());
    }

    #[test]
    fn dockerfile_copies_requirements_before_code() {
        let rendered = render_dockerfile(OdooVersion::new(17, 0), &UpgradeSettings::default(), true);

        let requirements = rendered.find("custom_addons/requirements.txt").unwrap();
        let code = rendered.find("./output/custom_addons/ ").unwrap();
        assert!(requirements < code);
        assert!(rendered.trim_end().ends_with("USER odoo"));
    }

    #[test]
    fn final_step_loads_custom_modules() {
        let modules = vec!["sale_extra".to_owned(), "stock_extra".to_owned()];
        let rendered = render_upgrade_compose(
            &DatabaseSettings::default(),
            &UpgradeSettings::default(),
            true,
            &modules,
        );

        assert!(rendered.contains("--addons-path=/mnt/extra-addons,/mnt/custom-addons\n"));
        assert!(rendered.contains("--load=base,web,openupgrade_framework,sale_extra,stock_extra\n"));
        assert!(rendered.contains("- ./output/filestore:/var/lib/odoo/filestore/database\n"));
    }

    #[test]
    fn intermediate_step_ignores_custom_modules() {
        let rendered = render_upgrade_compose(
            &DatabaseSettings::default(),
            &UpgradeSettings::default(),
            false,
            &[],
        );

        assert!(rendered.contains("--addons-path=/mnt/extra-addons\n"));
        assert!(rendered.contains("--load=base,web,openupgrade_framework\n"));
        assert!(rendered.contains("external: true"));
    }

    #[test]
    fn templates_are_trimmed_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dockerfile");

        write_template(&path, "\r\nFROM odoo:16.0\r\nUSER odoo\r\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "FROM odoo:16.0\nUSER odoo"
        );
    }
}
