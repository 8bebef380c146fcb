//! Version parsing and semantic-version arithmetic.
//!
//! Tags are always rendered as `v<major>.<minor>.<patch>`. Previous tags are
//! read leniently: anything that does not carry a `major.minor.patch` triple
//! is treated as `0.0.0`.

pub mod conventional;

use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from version operations.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Failed to parse a semver string.
    #[error("invalid semver: {0}")]
    InvalidSemver(#[from] semver::Error),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Semver bump level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    /// Patch release (x.y.Z).
    Patch,
    /// Minor release (x.Y.0).
    Minor,
    /// Major release (X.0.0).
    Major,
}

impl std::fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

/// Compute the next version by applying a bump level.
pub const fn next_version(current: &Version, level: BumpLevel) -> Version {
    match level {
        BumpLevel::Patch => Version::new(current.major, current.minor, current.patch + 1),
        BumpLevel::Minor => Version::new(current.major, current.minor + 1, 0),
        BumpLevel::Major => Version::new(current.major + 1, 0, 0),
    }
}

/// Parse a version string strictly, stripping an optional `v` prefix.
pub fn parse_version(s: &str) -> VersionResult<Version> {
    let s = s.strip_prefix('v').unwrap_or(s);
    Ok(Version::parse(s)?)
}

static TRIPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid version regex"));

/// Extract `major.minor.patch` from a tag such as `v1.2.3`, `release-1.2.3`
/// or `1.2.3-rc.1`.
///
/// Returns `None` when the tag carries no numeric triple. Pre-release and
/// build metadata are dropped.
pub fn version_in_tag(tag: &str) -> Option<Version> {
    let caps = TRIPLE.captures(tag)?;
    let major = caps[1].parse().ok()?;
    let minor = caps[2].parse().ok()?;
    let patch = caps[3].parse().ok()?;
    Some(Version::new(major, minor, patch))
}

/// The version a release starts from: the one in `tag`, or `0.0.0` when
/// the tag is absent or carries no numeric triple.
pub fn previous_version_from_tag(tag: Option<&str>) -> Version {
    tag.and_then(version_in_tag).unwrap_or_else(|| Version::new(0, 0, 0))
}

/// Render a version as a normalized tag: `v<major>.<minor>.<patch>`.
pub fn format_tag(version: &Version) -> String {
    format!("v{}.{}.{}", version.major, version.minor, version.patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_patch() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Patch), Version::new(1, 2, 4));
    }

    #[test]
    fn bump_minor() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Minor), Version::new(1, 3, 0));
    }

    #[test]
    fn bump_major() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Major), Version::new(2, 0, 0));
    }

    #[test]
    fn parse_with_v_prefix() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn parse_invalid() {
        assert!(parse_version("not-a-version").is_err());
    }

    #[test]
    fn previous_version_defaults_to_zero() {
        assert_eq!(previous_version_from_tag(None), Version::new(0, 0, 0));
        assert_eq!(
            previous_version_from_tag(Some("nightly")),
            Version::new(0, 0, 0)
        );
    }

    #[test]
    fn previous_version_is_lenient() {
        assert_eq!(
            previous_version_from_tag(Some("release-4.5.6")),
            Version::new(4, 5, 6)
        );
        assert_eq!(
            previous_version_from_tag(Some("v2.0.0-rc.1")),
            Version::new(2, 0, 0)
        );
    }

    #[test]
    fn version_in_tag_ignores_tags_without_a_triple() {
        assert_eq!(version_in_tag("1.4.0"), Some(Version::new(1, 4, 0)));
        assert_eq!(version_in_tag("app/v3.1.2"), Some(Version::new(3, 1, 2)));
        assert_eq!(version_in_tag("nightly"), None);
        assert_eq!(version_in_tag("v1.2"), None);
    }

    #[test]
    fn format_tag_drops_prerelease() {
        let v = Version::parse("1.2.3-beta.1").unwrap();
        assert_eq!(format_tag(&v), "v1.2.3");
    }

    #[test]
    fn bump_levels_order_by_severity() {
        assert!(BumpLevel::Major > BumpLevel::Minor);
        assert!(BumpLevel::Minor > BumpLevel::Patch);
        assert_eq!(BumpLevel::Minor.to_string(), "minor");
    }
}
