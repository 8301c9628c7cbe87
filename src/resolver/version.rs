//! Version ordering for registry version strings.
//!
//! npm versions are semver and compare through the `semver` crate. PyPI
//! versions frequently are not (`1.4`, `2.0.post1`), so anything that fails
//! strict semver parsing falls back to a loose dotted-segment comparison
//! where `1.10` > `1.9` and `1.4.2` > `1.4`.

use std::cmp::Ordering;

/// Compare two version strings with version-ordering semantics.
pub fn cmp(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => cmp_loose(a, b),
    }
}

/// True when `candidate` is a compatible release of `bound` (`~=`):
/// its release segments start with all of `bound`'s segments and it is
/// not older than `bound`.
pub fn is_compatible(candidate: &str, bound: &str) -> bool {
    let cand = segments(candidate);
    let base = segments(bound);

    if cand.len() < base.len() {
        return false;
    }
    if cand.iter().zip(base.iter()).any(|(c, b)| c != b) {
        return false;
    }
    cmp(candidate, bound) != Ordering::Less
}

#[derive(Debug, PartialEq, Eq)]
struct Segment {
    num: u64,
    suffix: String,
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num
            .cmp(&other.num)
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

fn segments(version: &str) -> Vec<Segment> {
    let trimmed = version.trim().trim_start_matches(['v', 'V']);
    trimmed
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            let num = digits.parse::<u64>().unwrap_or(0);
            Segment {
                num,
                suffix: part[digits.len()..].to_string(),
            }
        })
        .collect()
}

fn cmp_loose(a: &str, b: &str) -> Ordering {
    let sa = segments(a);
    let sb = segments(b);
    let pad = Segment {
        num: 0,
        suffix: String::new(),
    };

    for i in 0..sa.len().max(sb.len()) {
        let va = sa.get(i).unwrap_or(&pad);
        let vb = sb.get(i).unwrap_or(&pad);
        match va.cmp(vb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_beat_string_order() {
        assert_eq!(cmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(cmp("0.10.0", "0.9.9"), Ordering::Greater);
    }

    #[test]
    fn shorter_release_is_older() {
        assert_eq!(cmp("1.4", "1.4.2"), Ordering::Less);
        assert_eq!(cmp("1.4.0", "1.4"), Ordering::Equal);
    }

    #[test]
    fn semver_prerelease_ordering() {
        assert_eq!(cmp("1.2.3-alpha", "1.2.3"), Ordering::Less);
        assert_eq!(cmp("2.0.0", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn compatible_requires_full_bound_prefix() {
        assert!(is_compatible("1.4", "1.4"));
        assert!(is_compatible("1.4.2", "1.4"));
        assert!(!is_compatible("1.5", "1.4"));
        assert!(!is_compatible("1.3", "1.4"));
        assert!(!is_compatible("2.0", "1.4"));
    }

    #[test]
    fn compatible_respects_lower_bound() {
        assert!(is_compatible("1.4.5", "1.4.2"));
        assert!(!is_compatible("1.4.1", "1.4.2"));
    }

    #[test]
    fn leading_v_is_ignored() {
        assert_eq!(cmp("v1.2", "1.2"), Ordering::Equal);
    }
}
