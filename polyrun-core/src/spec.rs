//! Classification of raw dependency range strings.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Serialize;

use crate::error::{Error, Result};

static PROTOCOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*):(.*)$").expect("valid regex"));

static GITHUB_SHORTHAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9_.-]+(?:#\S*)?$").expect("valid regex")
});

/// scp-style git remotes such as `git@github.com:owner/repo.git`.
static SCP_GIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*@[A-Za-z0-9][A-Za-z0-9.-]*:[^\s:]\S*$")
        .expect("valid regex")
});

static COMPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(<=|>=|<|>|=|~>|~|\^)?v?(.+)$").expect("valid regex"));

static PARTIAL_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:0|[1-9]\d*|[xX*])(?:\.(?:0|[1-9]\d*|[xX*])){0,2}(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$",
    )
    .expect("valid regex")
});

static OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(<=|>=|<|>|=|~>|~|\^)$").expect("valid regex"));

/// The classified form of a dependency range string from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DependencySpec {
    /// A registry range such as `^1.2.3`, `*` or `npm:other-name@^2`.
    Npm {
        range: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// A non-registry reference (`file:`, `git:`, `workspace:`, ...).
    Url { protocol: String, suffix: String },
    /// A dist-tag or any other reference that is not a range.
    Tag { raw: String },
}

impl DependencySpec {
    /// Classifies a raw range string.
    ///
    /// Classification is total for printable input; only strings carrying
    /// control characters are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] if the string contains control characters.
    pub fn classify(raw: &str) -> Result<Self> {
        if raw.chars().any(char::is_control) {
            return Err(Error::InvalidSpec(raw.to_string()));
        }

        let (protocol, rest) = match PROTOCOL.captures(raw) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str()),
            ),
            None => (None, raw),
        };

        if matches!(protocol, None | Some("npm")) && (rest.trim().is_empty() || is_valid_range(rest))
        {
            let range = if rest.trim().is_empty() { "*" } else { rest };
            return Ok(DependencySpec::Npm {
                range: range.to_string(),
                alias: None,
            });
        }

        match protocol {
            Some("npm") => {
                let (alias, range) = split_alias(rest);
                Ok(DependencySpec::Npm {
                    range: if range.is_empty() { "*" } else { range }.to_string(),
                    alias: alias.map(str::to_string),
                })
            }
            Some(protocol) => Ok(DependencySpec::Url {
                protocol: protocol.to_string(),
                suffix: rest.to_string(),
            }),
            None if SCP_GIT.is_match(rest) => Ok(DependencySpec::Url {
                protocol: "git".to_string(),
                suffix: rest.to_string(),
            }),
            None if rest.starts_with(['.', '/', '~']) => Ok(DependencySpec::Url {
                protocol: "file".to_string(),
                suffix: rest.to_string(),
            }),
            None if GITHUB_SHORTHAND.is_match(rest) => Ok(DependencySpec::Url {
                protocol: "git".to_string(),
                suffix: format!("github.com/{}", rest),
            }),
            None => Ok(DependencySpec::Tag {
                raw: raw.to_string(),
            }),
        }
    }

    /// Returns the package name this entry resolves to.
    ///
    /// This is the manifest key unless the spec is an `npm:` alias.
    #[inline]
    pub fn package_name<'a>(&'a self, id: &'a str) -> &'a str {
        match self {
            DependencySpec::Npm {
                alias: Some(alias), ..
            } => alias,
            _ => id,
        }
    }

    #[inline]
    pub fn is_npm(&self) -> bool {
        matches!(self, DependencySpec::Npm { .. })
    }

    /// Returns the registry range, if this is an npm spec.
    #[inline]
    pub fn range(&self) -> Option<&str> {
        match self {
            DependencySpec::Npm { range, .. } => Some(range),
            _ => None,
        }
    }

    /// Whether the range admits `version`.
    ///
    /// Non-registry references and unparseable ranges never match.
    pub fn matches(&self, version: &Version) -> bool {
        self.range()
            .and_then(parse_range)
            .map(|alternatives| alternatives.iter().any(|req| req.matches(version)))
            .unwrap_or(false)
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencySpec::Npm {
                range,
                alias: Some(alias),
            } => write!(f, "npm:{}@{}", alias, range),
            DependencySpec::Npm { range, alias: None } => f.write_str(range),
            DependencySpec::Url { protocol, suffix } => write!(f, "{}:{}", protocol, suffix),
            DependencySpec::Tag { raw } => f.write_str(raw),
        }
    }
}

/// Whether `range` is a syntactically valid npm range.
pub fn is_valid_range(range: &str) -> bool {
    parse_range(range).is_some()
}

fn split_alias(rest: &str) -> (Option<&str>, &str) {
    let offset = usize::from(rest.starts_with('@'));
    match rest[offset..].find('@') {
        Some(idx) => {
            let at = offset + idx;
            (Some(&rest[..at]), &rest[at + 1..])
        }
        None if !rest.is_empty() => (Some(rest), ""),
        None => (None, ""),
    }
}

/// Translates an npm range into one `VersionReq` per `||` alternative.
fn parse_range(range: &str) -> Option<Vec<VersionReq>> {
    let range = range.trim();
    if range.is_empty() {
        return Some(vec![VersionReq::STAR]);
    }
    range
        .split("||")
        .map(|set| parse_comparator_set(set.trim()))
        .collect()
}

fn parse_comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() {
        return Some(VersionReq::STAR);
    }

    if let Some((lower, upper)) = set.split_once(" - ") {
        let lower = partial_version(lower.trim())?;
        let upper = partial_version(upper.trim())?;
        let bounds: Vec<String> = [
            (!lower.is_empty()).then(|| format!(">={}", lower)),
            (!upper.is_empty()).then(|| format!("<={}", upper)),
        ]
        .into_iter()
        .flatten()
        .collect();
        return requirement(&bounds);
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in set.split_whitespace() {
        if OPERATOR.is_match(token) {
            if pending_op.replace(token).is_some() {
                return None;
            }
            continue;
        }
        let joined = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        if let Some(comparator) = comparator(&joined)? {
            comparators.push(comparator);
        }
    }
    if pending_op.is_some() {
        return None;
    }
    requirement(&comparators)
}

fn requirement(comparators: &[String]) -> Option<VersionReq> {
    if comparators.is_empty() {
        return Some(VersionReq::STAR);
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Normalizes one comparator; `Some(None)` means "any version".
fn comparator(token: &str) -> Option<Option<String>> {
    let caps = COMPARATOR.captures(token)?;
    let op = caps.get(1).map_or("", |m| m.as_str());
    let version = partial_version(caps.get(2)?.as_str())?;
    if version.is_empty() {
        return Some(None);
    }
    // A bare full version is an exact match in npm but a caret in semver.
    let op = match op {
        "" => "=",
        "~>" => "~",
        op => op,
    };
    Some(Some(format!("{}{}", op, version)))
}

/// Validates a partial version and drops trailing wildcard components.
fn partial_version(version: &str) -> Option<String> {
    let version = version.strip_prefix('v').unwrap_or(version);
    if !PARTIAL_VERSION.is_match(version) {
        return None;
    }
    let (core, tail) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };
    let mut parts = Vec::new();
    let mut wildcard = false;
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*") {
            wildcard = true;
        } else if wildcard {
            return None;
        } else {
            parts.push(part);
        }
    }
    if wildcard && !tail.is_empty() {
        return None;
    }
    Some(format!("{}{}", parts.join("."), tail))
}
