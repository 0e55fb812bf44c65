//! Domain validation and normalization.
//!
//! A [`Domain`] is a bare DNS host name in canonical form: trimmed,
//! lower-cased, no scheme, path, port or wildcard. Raw user input goes
//! through [`normalize`] and [`validate`] before it becomes a `Domain`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Host grammar over lower-cased ASCII: dot-separated labels of
/// alphanumerics and hyphens that do not start or end with a hyphen, ending
/// in an alphabetic TLD of two or more characters.
static HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("Invalid host regex")
});

/// Domains the extension acts on out of the box.
///
/// Never persisted and never user-editable.
pub const BUILTIN_DOMAINS: &[&str] = &[
    // Feishu (mainland)
    "feishu.cn",
    "feishu.net",
    // Lark (international)
    "larksuite.com",
    "larkoffice.com",
];

/// Trims surrounding whitespace and lower-cases.
///
/// Total: any string normalizes. The result is not necessarily valid.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Checks whether `input` is a syntactically valid host name.
///
/// Only ASCII hosts qualify; internationalized names must be given in their
/// punycode form.
pub fn validate(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.is_ascii() {
        return false;
    }
    if trimmed.contains("://") || trimmed.contains('/') {
        return false;
    }
    HOST_RE.is_match(&trimmed.to_ascii_lowercase())
}

/// Returns true if `domain` (any case, surrounding whitespace ignored) is one
/// of the built-in domains.
pub fn is_builtin(domain: &str) -> bool {
    let normalized = normalize(domain);
    BUILTIN_DOMAINS.iter().any(|b| *b == normalized)
}

/// Host-suffix match: `host` is `domain` itself or any subdomain of it.
///
/// A port suffix on `host` is ignored.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.split(':').next().unwrap_or(host).to_lowercase();
    let host = host.trim_end_matches('.');
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// A normalized, validated host name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Normalizes `raw` and returns it as a `Domain` if it passes validation.
    pub fn parse(raw: &str) -> Option<Self> {
        // Validate before lower-casing so non-ASCII input cannot fold into ASCII
        validate(raw).then(|| Self(normalize(raw)))
    }

    /// Returns the built-in domain set in its fixed order.
    pub fn builtins() -> Vec<Domain> {
        BUILTIN_DOMAINS
            .iter()
            .map(|d| Domain((*d).to_string()))
            .collect()
    }

    /// The canonical host string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is one of the built-in domains.
    pub fn is_builtin(&self) -> bool {
        BUILTIN_DOMAINS.contains(&self.0.as_str())
    }

    /// Returns true if `host` is this domain or one of its subdomains.
    pub fn covers_host(&self, host: &str) -> bool {
        host_matches(host, &self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Domain {
    type Error = InvalidDomain;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Domain::parse(&value).ok_or(InvalidDomain(value))
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

/// Raised when a string does not satisfy the host grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid domain: {0:?}")]
pub struct InvalidDomain(pub String);
