//! # Version Selection
//!
//! Picks the newest release out of a list of raw tag names, as published by
//! source-control tags or container-registry tags.
//!
//! Tags are parsed leniently: an optional `v`, one or more dot-separated
//! numeric segments, an optional `-prerelease` and an optional `+metadata`.
//! Anything else is ignored without an error.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[vV]?(\d+(?:\.\d+)*)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$")
            .unwrap_or_else(|e| panic!("version pattern does not compile: {e}"))
    })
}

/// A parsed tag. Build metadata does not take part in ordering, and
/// equality agrees with ordering: `1.2 == 1.2.0`.
#[derive(Debug, Clone)]
pub struct Version {
    numbers: Vec<u64>,
    prerelease: Vec<String>,
}

impl Version {
    /// Parses a tag, returning `None` when it does not look like a version.
    pub fn parse(tag: &str) -> Option<Self> {
        let caps = tag_pattern().captures(tag.trim())?;
        let numbers = caps[1]
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let prerelease = caps
            .get(2)
            .map(|m| m.as_str().split('.').map(str::to_string).collect())
            .unwrap_or_default();
        Some(Self { numbers, prerelease })
    }

    /// `true` if the tag carried a `-prerelease` part.
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing numeric segments count as zero: 1.2 == 1.2.0.
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_prerelease(&self.prerelease, &other.prerelease),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_prerelease(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// # Latest Version
///
/// Returns the original text of the highest version among `tags`.
///
/// Empty tags and `latest` are always dropped. Tags containing `beta` (any
/// case) are dropped unless `include_beta` is set. Returns `None` when no tag
/// survives filtering and parsing.
pub fn latest_version<I, S>(tags: I, include_beta: bool) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut best: Option<(Version, String)> = None;

    for tag in tags {
        let tag = tag.as_ref();
        if tag.is_empty() || tag == "latest" {
            continue;
        }
        if !include_beta && tag.to_ascii_lowercase().contains("beta") {
            continue;
        }
        let Some(version) = Version::parse(tag) else {
            continue;
        };
        // Ties keep the first tag seen.
        if best.as_ref().map_or(true, |(current, _)| version > *current) {
            best = Some((version, tag.to_string()));
        }
    }

    best.map(|(_, tag)| tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beta_is_dropped_by_default() {
        let tags = ["1.0.0", "latest", "1.1.0-beta", "2.0.0"];
        assert_eq!(latest_version(tags, false).as_deref(), Some("2.0.0"));
        assert_eq!(latest_version(tags, true).as_deref(), Some("2.0.0"));
    }

    #[test]
    fn beta_wins_only_when_included() {
        let tags = ["1.0.0", "1.1.0-BETA.2"];
        assert_eq!(latest_version(tags, false).as_deref(), Some("1.0.0"));
        assert_eq!(latest_version(tags, true).as_deref(), Some("1.1.0-BETA.2"));
    }

    #[test]
    fn no_valid_tags_yields_none() {
        assert_eq!(latest_version(["latest", "", "nightly", "main"], true), None);
        assert_eq!(latest_version(Vec::<String>::new(), false), None);
    }

    #[test]
    fn original_tag_text_is_preserved() {
        let tags = vec![String::from("v5.3.1"), String::from("5.2.9")];
        assert_eq!(latest_version(&tags, false).as_deref(), Some("v5.3.1"));
    }

    #[test]
    fn numeric_segments_compare_as_numbers() {
        assert_eq!(latest_version(["5.9", "5.10", "5.2.1"], false).as_deref(), Some("5.10"));
    }

    #[test]
    fn prerelease_sorts_below_its_release() {
        assert_eq!(latest_version(["3.0.0-rc.1", "3.0.0"], false).as_deref(), Some("3.0.0"));
        assert_eq!(latest_version(["3.0.0-rc.1", "3.0.0-rc.2"], false).as_deref(), Some("3.0.0-rc.2"));
        assert_eq!(latest_version(["2.9.9", "3.0.0-rc.1"], false).as_deref(), Some("3.0.0-rc.1"));
    }

    #[test]
    fn build_metadata_is_accepted_and_ignored() {
        let a = Version::parse("1.2.3+build.7").unwrap();
        let b = Version::parse("1.2.3").unwrap();
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn equality_agrees_with_ordering() {
        let short = Version::parse("1.2").unwrap();
        let long = Version::parse("v1.2.0").unwrap();
        assert_eq!(short, long);
        assert_ne!(short, Version::parse("1.2.0-rc.1").unwrap());

        let set: std::collections::BTreeSet<Version> = [short, long].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn malformed_tags_are_ignored() {
        assert!(Version::parse("1..2").is_none());
        assert!(Version::parse("release-1.0").is_none());
        assert!(Version::parse("1.0.x").is_none());
        assert_eq!(latest_version(["1.0.x", "0.9"], false).as_deref(), Some("0.9"));
    }
}
