use std::{fmt, str::FromStr};

use crate::CommonError;

/// Target versions OpenUpgrade publishes branches for.
pub const SUPPORTED_VERSIONS: [&str; 9] = [
    "10.0", "11.0", "12.0", "13.0", "14.0", "15.0", "16.0", "17.0", "18.0",
];

/// Databases older than this cannot enter the ladder.
pub const MINIMUM_VERSION: OdooVersion = OdooVersion::new(10, 0);

/// An Odoo series, as found in `ir_module_module.latest_version` (`16.0.1.3`)
/// or given on the command line (`16.0`). Only the first two components
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OdooVersion {
    pub major: u32,
    pub minor: u32,
}

impl OdooVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses a version that must be one of [`SUPPORTED_VERSIONS`].
    pub fn parse_target(input: &str) -> Result<Self, CommonError> {
        let trimmed = input.trim();
        if !SUPPORTED_VERSIONS.contains(&trimmed) {
            return Err(CommonError::UnsupportedTarget(trimmed.to_owned()));
        }
        trimmed.parse()
    }

    #[must_use]
    pub const fn next_major(self) -> Self {
        Self::new(self.major + 1, 0)
    }

    #[must_use]
    pub const fn same_major(self, other: Self) -> bool {
        self.major == other.major
    }

    #[must_use]
    pub fn is_below_minimum(self) -> bool {
        self < MINIMUM_VERSION
    }
}

impl fmt::Display for OdooVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for OdooVersion {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');

        let major = parts
            .next()
            .and_then(leading_number)
            .ok_or_else(|| CommonError::InvalidVersion(s.to_owned()))?;
        let minor = parts.next().and_then(leading_number).unwrap_or(0);

        Ok(Self::new(major, minor))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(part.len(), |(idx, _)| idx);

    part[..end].parse().ok()
}

/// Every intermediate series a database at `current` has to go through to
/// reach `target`, in order. Empty when `current` already is at or past the
/// target series.
#[must_use]
pub fn upgrade_path(current: OdooVersion, target: OdooVersion) -> Vec<OdooVersion> {
    let mut steps = vec![];
    let mut cursor = current;

    while cursor.major < target.major {
        cursor = cursor.next_major();
        steps.push(cursor);
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{Expect, expect};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn check(input: &str, expect: Expect) {
        let res = input.parse::<OdooVersion>();
        expect.assert_debug_eq(&res);
    }

    #[test]
    fn parses_database_version_strings() {
        check(
            "16.0.1.3",
            expect![[r#"
                Ok(
                    OdooVersion {
                        major: 16,
                        minor: 0,
                    },
                )
            "#]],
        );
    }

    #[test]
    fn parses_version_with_padding_and_missing_minor() {
        check(
            "  12 \n",
            expect![[r#"
                Ok(
                    OdooVersion {
                        major: 12,
                        minor: 0,
                    },
                )
            "#]],
        );
    }

    #[test]
    fn rejects_text_without_a_major() {
        check(
            "",
            expect![[r#"
                Err(
                    InvalidVersion(
                        "",
                    ),
                )
            "#]],
        );
        check(
            "saas~16.1",
            expect![[r#"
                Err(
                    InvalidVersion(
                        "saas~16.1",
                    ),
                )
            "#]],
        );
    }

    #[test]
    fn target_must_be_on_the_ladder() {
        assert_eq!(
            OdooVersion::parse_target("17.0").ok(),
            Some(OdooVersion::new(17, 0))
        );
        assert!(matches!(
            OdooVersion::parse_target("9.0"),
            Err(CommonError::UnsupportedTarget(_))
        ));
        assert!(matches!(
            OdooVersion::parse_target("19.0"),
            Err(CommonError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn below_minimum() {
        assert!(OdooVersion::new(9, 0).is_below_minimum());
        assert!(!OdooVersion::new(10, 0).is_below_minimum());
    }

    #[test]
    fn path_walks_every_major() {
        let path = upgrade_path(OdooVersion::new(13, 0), OdooVersion::new(16, 0));
        let rendered: Vec<String> = path.iter().map(ToString::to_string).collect();

        assert_eq!(rendered, vec!["14.0", "15.0", "16.0"]);
    }

    #[test]
    fn path_is_empty_when_already_there() {
        assert!(upgrade_path(OdooVersion::new(16, 0), OdooVersion::new(16, 0)).is_empty());
        assert!(upgrade_path(OdooVersion::new(17, 0), OdooVersion::new(15, 0)).is_empty());
    }

    proptest! {
        #[test]
        fn display_is_parseable(major in 0u32..1000, minor in 0u32..1000) {
            let version = OdooVersion::new(major, minor);
            prop_assert_eq!(version.to_string().parse::<OdooVersion>().ok(), Some(version));
        }

        #[test]
        fn path_ends_on_target_major(current in 10u32..18, target in 10u32..19) {
            let path = upgrade_path(OdooVersion::new(current, 0), OdooVersion::new(target, 0));
            prop_assert_eq!(path.len() as u32, target.saturating_sub(current));
            if let Some(last) = path.last() {
                prop_assert_eq!(last.major, target);
            }
        }
    }
}
