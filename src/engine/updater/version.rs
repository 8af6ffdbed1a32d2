//! Version comparison
//!
//! Versions are `major.minor.patch` triples compared numerically. Parsing
//! never fails: it reads segments left to right and stops at the first one
//! that does not start with a digit, leaving that segment and every later
//! one at zero. `"1.2.3-beta"` is `1.2.3`, `"1.x.3"` is `1.0.0` and
//! `"v1.2"` is `0.0.0`.

use std::cmp::Ordering;
use std::fmt;

/// A parsed `major.minor.patch` triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse greedily, defaulting missing or invalid segments to zero.
    pub fn parse_lenient(input: &str) -> Self {
        let mut segments = [0u64; 3];
        let mut rest = input.trim();

        for (i, slot) in segments.iter_mut().enumerate() {
            if i > 0 {
                match rest.strip_prefix('.') {
                    Some(r) => rest = r,
                    None => break,
                }
            }
            let digits = rest
                .bytes()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits == 0 {
                break;
            }
            match rest[..digits].parse::<u64>() {
                Ok(n) => *slot = n,
                Err(_) => break,
            }
            rest = &rest[digits..];
        }

        Self::new(segments[0], segments[1], segments[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare two version strings: major, then minor, then patch.
pub fn compare(a: &str, b: &str) -> Ordering {
    Version::parse_lenient(a).cmp(&Version::parse_lenient(b))
}

/// True if `a` is strictly newer than `b`
pub fn is_newer(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Greater
}
