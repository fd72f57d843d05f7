//! Name/version pattern matching for graph queries
//!
//! Accepted pattern forms:
//!
//! | pattern          | name            | version              |
//! |------------------|-----------------|----------------------|
//! | `foo`            | exact           | any                  |
//! | `foo@1.2.3`      | exact           | exact                |
//! | `foo@^1.0.0`     | exact           | satisfies the range  |
//! | `@vue/*@^3`      | wildcard        | satisfies the range  |
//! | `ui@link:../ui`  | exact           | exact string         |

use crate::error::{Error, Result};
use crate::model::split_spec;
use node_semver::{Range, Version};
use regex::Regex;
use std::str::FromStr;

#[derive(Debug, Clone)]
enum NameMatcher {
    Exact(String),
    Glob(Regex),
}

#[derive(Debug, Clone)]
enum VersionMatcher {
    Any,
    Exact(String),
    Range(Range),
}

/// A compiled name/version predicate.
#[derive(Debug, Clone)]
pub struct FilterPattern {
    source: String,
    name: NameMatcher,
    version: VersionMatcher,
}

impl FilterPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        let invalid = |reason: String| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let (name, version) = match split_spec(pattern) {
            Some((name, version)) => (name, Some(version)),
            None => (pattern, None),
        };
        if name.is_empty() {
            return Err(invalid("missing package name".to_string()));
        }

        let name_matcher = if name.contains('*') {
            let regex = glob_to_regex(name).map_err(|e| invalid(e.to_string()))?;
            NameMatcher::Glob(regex)
        } else {
            NameMatcher::Exact(name.to_string())
        };

        let version_matcher = match version {
            None | Some("") => VersionMatcher::Any,
            Some(v) if Version::parse(v).is_ok() => VersionMatcher::Exact(v.to_string()),
            // Non-semver versions such as `link:` or git URLs compare literally.
            Some(v) => match Range::parse(v) {
                Ok(range) => VersionMatcher::Range(range),
                Err(_) => VersionMatcher::Exact(v.to_string()),
            },
        };

        Ok(FilterPattern {
            source: pattern.to_string(),
            name: name_matcher,
            version: version_matcher,
        })
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        let name_ok = match &self.name {
            NameMatcher::Exact(expected) => expected == name,
            NameMatcher::Glob(regex) => regex.is_match(name),
        };
        name_ok
            && match &self.version {
                VersionMatcher::Any => true,
                VersionMatcher::Exact(expected) => expected == version,
                VersionMatcher::Range(range) => {
                    Version::parse(version).is_ok_and(|v| range.satisfies(&v))
                }
            }
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for FilterPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FilterPattern::parse(s)
    }
}

/// Translate a `*` wildcard into an anchored regex. Everything else is literal.
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
}

/// How the patterns of a [`FilterSet`] combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// At least one pattern matches. An empty set matches nothing.
    #[default]
    Any,
    /// Every pattern matches. An empty set matches everything.
    All,
}

#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<FilterPattern>,
    mode: MatchMode,
}

impl FilterSet {
    pub fn new(patterns: Vec<FilterPattern>, mode: MatchMode) -> Self {
        FilterSet { patterns, mode }
    }

    /// Compile a list of pattern strings, failing on the first invalid one.
    pub fn parse<I, S>(patterns: I, mode: MatchMode) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| FilterPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(FilterSet::new(patterns, mode))
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        match self.mode {
            MatchMode::Any => self.patterns.iter().any(|p| p.matches(name, version)),
            MatchMode::All => self.patterns.iter().all(|p| p.matches(name, version)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
