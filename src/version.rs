//! API version negotiation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `major.minor` API version.
///
/// Laid out minor-first so it matches the packed 32-bit version word used on
/// the native side. Ordering compares the major number first.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ApiVersion {
    /// Minor version.
    pub minor: u16,
    /// Major version.
    pub major: u16,
}

impl ApiVersion {
    /// The newest API version this dispatcher knows about.
    pub const CURRENT: ApiVersion = ApiVersion::new(2, 2);

    /// The oldest API version a backend can report.
    pub const MIN: ApiVersion = ApiVersion::new(1, 0);

    /// Create a version from its parts.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { minor, major }
    }

    /// Whether a backend-reported version passes the sanity bounds.
    ///
    /// The dispatcher trusts backend self-reports, but a zero or absurd
    /// major number means the backend wrote garbage.
    pub const fn is_plausible(self) -> bool {
        self.major >= 1 && self.major <= 255
    }

    /// The packed `(major << 16) | minor` form.
    pub const fn packed(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Error parsing an [`ApiVersion`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid API version '{0}', expected MAJOR.MINOR")]
pub struct ParseVersionError(String);

impl FromStr for ApiVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(err)?;
        let major = major.parse().map_err(|_| err())?;
        let minor = minor.parse().map_err(|_| err())?;
        Ok(Self::new(major, minor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_major_first() {
        assert!(ApiVersion::new(2, 0) > ApiVersion::new(1, 35));
        assert!(ApiVersion::new(1, 2) > ApiVersion::new(1, 1));
        assert!(ApiVersion::new(1, 1) < ApiVersion::new(2, 0));
        assert_eq!(
            ApiVersion::new(2, 1).cmp(&ApiVersion::new(2, 1)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("2.1".parse(), Ok(ApiVersion::new(2, 1)));
        assert_eq!(" 1.35 ".parse(), Ok(ApiVersion::new(1, 35)));
        assert!("2".parse::<ApiVersion>().is_err());
        assert!("a.b".parse::<ApiVersion>().is_err());
        assert!("1.70000".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_display_and_packed() {
        let v = ApiVersion::new(2, 2);
        assert_eq!(v.to_string(), "2.2");
        assert_eq!(v.packed(), 0x0002_0002);
    }

    #[test]
    fn test_plausible() {
        assert!(ApiVersion::new(1, 0).is_plausible());
        assert!(!ApiVersion::new(0, 9).is_plausible());
        assert!(!ApiVersion::new(1000, 0).is_plausible());
    }
}
