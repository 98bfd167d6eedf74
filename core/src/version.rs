//! Version — tolerant parsing and ordering of multiplexer and dependency
//! version strings.
//!
//! Handles plain dotted versions (`1.8.5`), letter point releases (`3.2a`),
//! pre-release suffixes (`2.6-rc5`), and the development forms tmux reports
//! (`next-3.5`, `master`). Used by the plugin loader for dependency bounds
//! and by the builder for the layout-hook version threshold.

use std::cmp::Ordering;
use std::fmt;


/// A parsed version: numeric dot components plus an optional suffix.
///
/// Trailing zero components are dropped at parse time so `1.8` and `1.8.0`
/// compare (and test) equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    parts: Vec<u32>,
    suffix: Suffix,
    dev: bool,
}


/// Suffix classification. A `-`-prefixed suffix is a pre-release and sorts
/// below the bare release; a letter suffix (`3.2a`) is a point release and
/// sorts above it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Suffix {
    Pre(String),
    Release,
    Point(String),
}

impl Suffix {
    fn rank(&self) -> u8 {
        match self {
            Suffix::Pre(_) => 0,
            Suffix::Release => 1,
            Suffix::Point(_) => 2,
        }
    }

    fn text(&self) -> &str {
        match self {
            Suffix::Pre(s) | Suffix::Point(s) => s,
            Suffix::Release => "",
        }
    }
}


impl Version {
    /// Build a version from bare numeric components.
    pub fn from_parts(parts: Vec<u32>) -> Version {
        let mut parts = parts;
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Version {
            parts,
            suffix: Suffix::Release,
            dev: false,
        }
    }

    /// Parse a version string.
    ///
    /// Accepts an optional leading `v` or `next-` prefix; `master` (tmux
    /// built from source) parses as a version greater than any release.
    pub fn parse(input: &str) -> Result<Version, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("empty version string".to_string());
        }
        if trimmed == "master" {
            return Ok(Version {
                parts: vec![u32::MAX],
                suffix: Suffix::Release,
                dev: true,
            });
        }
        let body = trimmed
            .strip_prefix("next-")
            .or_else(|| trimmed.strip_prefix('v'))
            .unwrap_or(trimmed);

        let mut parts = Vec::new();
        let mut suffix = Suffix::Release;
        for (i, component) in body.split('.').enumerate() {
            let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(format!("non-numeric version component in '{}'", input));
            }
            let number = digits
                .parse::<u32>()
                .map_err(|_| format!("version component out of range in '{}'", input))?;
            parts.push(number);

            let rest = &component[digits.len()..];
            if !rest.is_empty() {
                suffix = if let Some(pre) = rest.strip_prefix('-') {
                    Suffix::Pre(pre.to_string())
                } else {
                    Suffix::Point(rest.to_string())
                };
                if i + 1 != body.split('.').count() {
                    return Err(format!("suffix before final component in '{}'", input));
                }
            }
        }
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Ok(Version {
            parts,
            suffix,
            dev: false,
        })
    }
}


impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        let width = self.parts.len().max(other.parts.len());
        for i in 0..width {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        match self.suffix.rank().cmp(&other.suffix.rank()) {
            Ordering::Equal => self.suffix.text().cmp(other.suffix.text()),
            unequal => unequal,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}


impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dev {
            return write!(f, "master");
        }
        let joined = self
            .parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        match &self.suffix {
            Suffix::Release => write!(f, "{}", joined),
            Suffix::Point(s) => write!(f, "{}{}", joined, s),
            Suffix::Pre(s) => write!(f, "{}-{}", joined, s),
        }
    }
}

impl std::str::FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Version, String> {
        Version::parse(s)
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
