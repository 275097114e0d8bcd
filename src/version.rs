//! Package version ordering.
//!
//! A version is a dotted numeric release followed by an optional pre-release
//! tag and an arbitrary suffix:
//!
//! * release segments compare numerically, and missing trailing segments count
//!   as zero (`1.7 == 1.7.0`, `1.10 > 1.9`);
//! * a pre-release (`1.7~rc0`, `2.0.rc1`, `1.7-beta2`, `1.7rc1`) sorts before
//!   the plain release; tags order `alpha < beta < rc`, then by number;
//! * anything else after the release (Debian revisions, build stamps such as
//!   `-0.20170405.3b5fd3c-1`) is kept for display but ignored for ordering.
use std::{cmp::Ordering, fmt, str::FromStr, sync::OnceLock};

use regex::Regex;

use crate::error::VersionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreTag {
    Alpha,
    Beta,
    Rc,
}

/// A parsed, comparable package version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    release: Vec<u64>,
    pre: Option<(PreTag, u64)>,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)*)(?:[~.\-_]?(alpha|beta|rc)\.?(\d*))?")
            .expect("valid version regex")
    })
}

impl Version {
    /// Numeric release segments with trailing zeros removed.
    fn significant_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |idx| idx + 1);
        &self.release[..end]
    }

    pub fn major(&self) -> u64 {
        self.release.first().copied().unwrap_or(0)
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Extracts the first capture of `pattern` from `text` and parses it.
    pub fn extract(pattern: &str, text: &str) -> Result<Self, VersionError> {
        let not_found = || VersionError::NotFound {
            pattern: pattern.to_string(),
        };
        let re = Regex::new(pattern).map_err(|_| not_found())?;
        let caps = re.captures(text).ok_or_else(not_found)?;
        let matched = caps.get(1).or_else(|| caps.get(0)).ok_or_else(not_found)?;
        matched.as_str().trim().trim_matches('.').parse()
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let caps = version_regex()
            .captures(raw)
            .ok_or_else(|| VersionError::Invalid(raw.to_string()))?;

        let release = caps[1]
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionError::Invalid(raw.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.get(2) {
            Some(tag) => {
                let tag = match tag.as_str() {
                    "alpha" => PreTag::Alpha,
                    "beta" => PreTag::Beta,
                    _ => PreTag::Rc,
                };
                let number = caps
                    .get(3)
                    .map(|m| m.as_str())
                    .filter(|digits| !digits.is_empty())
                    .map_or(Ok(0), str::parse::<u64>)
                    .map_err(|_| VersionError::Invalid(raw.to_string()))?;
                Some((tag, number))
            }
            None => None,
        };

        Ok(Self {
            raw: raw.to_string(),
            release,
            pre,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.significant_release();
        let right = other.significant_release();
        let width = left.len().max(right.len());

        for idx in 0..width {
            let a = left.get(idx).copied().unwrap_or(0);
            let b = right.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether `version` has reached `gate`.
pub fn meets(version: &Version, gate: &str) -> Result<bool, VersionError> {
    Ok(*version >= gate.parse::<Version>()?)
}
