use odoo_upgrader_common::{MINIMUM_VERSION, OdooVersion, upgrade_path};

use crate::CliError;

/// Prints one line per OpenUpgrade run needed to go from `from` to `to`.
pub fn handle(from: &str, to: &str) -> Result<(), CliError> {
    let current: OdooVersion = from.parse()?;
    let target = OdooVersion::parse_target(to)?;

    let steps = upgrade_path(current, target);
    for line in describe(current, target, &steps) {
        println!("{line}");
    }

    Ok(())
}

pub(crate) fn describe(
    current: OdooVersion,
    target: OdooVersion,
    steps: &[OdooVersion],
) -> Vec<String> {
    if current.is_below_minimum() {
        return vec![format!(
            "{current} is older than {MINIMUM_VERSION}, OpenUpgrade cannot migrate it."
        )];
    }

    if steps.is_empty() {
        return vec![format!(
            "{current} is already at or past {target}, only the package would be rebuilt."
        )];
    }

    let mut lines = vec![format!("{current} → {target} in {} step(s):", steps.len())];
    let mut previous = current;
    for (i, step) in steps.iter().enumerate() {
        lines.push(format!("  {}. {previous} → {step}", i + 1));
        previous = *step;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn render(from: &str, to: &str) -> String {
        let current = from.parse().unwrap();
        let target = OdooVersion::parse_target(to).unwrap();
        describe(current, target, &upgrade_path(current, target)).join("\n")
    }

    #[test]
    fn lists_each_series() {
        expect![[r#"
            14.0 → 17.0 in 3 step(s):
              1. 14.0 → 15.0
              2. 15.0 → 16.0
              3. 16.0 → 17.0"#]]
        .assert_eq(&render("14.0.1.3", "17.0"));
    }

    #[test]
    fn nothing_to_do() {
        expect!["16.0 is already at or past 15.0, only the package would be rebuilt."]
            .assert_eq(&render("16.0", "15.0"));
    }

    #[test]
    fn too_old() {
        expect!["9.0 is older than 10.0, OpenUpgrade cannot migrate it."]
            .assert_eq(&render("9.0", "12.0"));
    }
}
