use crate::HubError;
use semver::Version;
use std::fmt;

/// A semantic version parsed from an image tag.
///
/// Parsing is tolerant of the shapes tags take in practice: a leading `v` or
/// `V`, and a missing minor or patch component (`v1`, `1.2`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionTag(Version);

impl VersionTag {
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        let trimmed = raw.trim();
        let s = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let core_end = s.find(['-', '+']).unwrap_or(s.len());
        let (core, suffix) = s.split_at(core_end);
        let padded = match core.split('.').count() {
            1 => format!("{core}.0.0{suffix}"),
            2 => format!("{core}.0{suffix}"),
            _ => s.to_owned(),
        };
        Version::parse(&padded)
            .map(Self)
            .map_err(|_| HubError::VersionUnparsable(raw.to_owned()))
    }

    pub fn zero() -> Self {
        Self(Version::new(0, 0, 0))
    }

    pub fn version(&self) -> &Version {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Lowest version considered an incompatible upgrade: the next major
    /// release, or the next minor release while still in 0.x.
    pub fn breaking_threshold(&self) -> Self {
        if self.0.major >= 1 {
            Self(Version::new(self.0.major + 1, 0, 0))
        } else {
            Self(Version::new(0, self.0.minor + 1, 0))
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tolerates_prefix_and_padding() {
        assert_eq!(VersionTag::parse("v1").unwrap().version(), &Version::new(1, 0, 0));
        assert_eq!(VersionTag::parse("V1.2").unwrap().version(), &Version::new(1, 2, 0));
        assert_eq!(
            VersionTag::parse("0.24.0").unwrap().version(),
            &Version::new(0, 24, 0)
        );
    }

    #[test]
    fn parse_keeps_prerelease_label() {
        let tag = VersionTag::parse("v2.14.0-drivers").unwrap();
        assert!(tag.is_prerelease());
        assert_eq!(tag.version().pre.as_str(), "drivers");

        let padded = VersionTag::parse("v0.24-rc2").unwrap();
        assert_eq!(padded.to_string(), "v0.24.0-rc2");
    }

    #[test]
    fn parse_rejects_non_versions() {
        for raw in ["latest", "", "v", "dev", "1.2.3.4", "abc-1.0"] {
            assert!(
                matches!(VersionTag::parse(raw), Err(HubError::VersionUnparsable(_))),
                "{raw} should not parse"
            );
        }
    }

    #[test]
    fn breaking_threshold_by_major() {
        let t = VersionTag::parse("1.4.2").unwrap().breaking_threshold();
        assert_eq!(t.version(), &Version::new(2, 0, 0));
        let t = VersionTag::parse("0.10.3").unwrap().breaking_threshold();
        assert_eq!(t.version(), &Version::new(0, 11, 0));
    }

    #[test]
    fn display_has_v_prefix() {
        assert_eq!(VersionTag::parse("0.10.1").unwrap().to_string(), "v0.10.1");
        assert!(VersionTag::zero().is_zero());
    }
}
