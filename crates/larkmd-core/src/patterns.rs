//! URL match patterns derived from domains.
//!
//! Each domain yields an exact-host pattern and a wildcard-subdomain pattern,
//! both on `https` with a `/*` path wildcard. Patterns are never stored; they
//! are recomputed from the domain lists whenever a consumer needs them.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::domain::{host_matches, Domain};

const SCHEME: &str = "https";

/// Returns `[exact, wildcard]` patterns for `domain`, in that order.
pub fn patterns_for(domain: &Domain) -> [String; 2] {
    [
        UrlPattern::exact(domain).to_string(),
        UrlPattern::subdomains(domain).to_string(),
    ]
}

/// Built-in patterns in built-in order followed by custom patterns in custom
/// order. No deduplication.
pub fn all_patterns(builtins: &[Domain], custom: &[Domain]) -> Vec<String> {
    builtins
        .iter()
        .chain(custom.iter())
        .flat_map(patterns_for)
        .collect()
}

/// A parsed `https://<host>/*` or `https://*.<host>/*` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlPattern {
    host: String,
    any_subdomain: bool,
}

impl UrlPattern {
    /// Pattern matching exactly `domain`.
    pub fn exact(domain: &Domain) -> Self {
        Self {
            host: domain.as_str().to_string(),
            any_subdomain: false,
        }
    }

    /// Pattern matching any subdomain of `domain` (and `domain` itself).
    pub fn subdomains(domain: &Domain) -> Self {
        Self {
            host: domain.as_str().to_string(),
            any_subdomain: true,
        }
    }

    /// Checks whether `url` falls under this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        if url.scheme() != SCHEME {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.any_subdomain {
            host_matches(host, &self.host)
        } else {
            host.eq_ignore_ascii_case(&self.host)
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any_subdomain {
            write!(f, "{SCHEME}://*.{}/*", self.host)
        } else {
            write!(f, "{SCHEME}://{}/*", self.host)
        }
    }
}

/// Raised when a string is not a pattern this crate produces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported URL pattern: {0:?}")]
pub struct InvalidPattern(pub String);

impl FromStr for UrlPattern {
    type Err = InvalidPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPattern(s.to_string());
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .and_then(|r| r.strip_suffix("/*"))
            .ok_or_else(invalid)?;

        let (host, any_subdomain) = match rest.strip_prefix("*.") {
            Some(host) => (host, true),
            None => (rest, false),
        };
        let domain = Domain::parse(host).ok_or_else(invalid)?;

        Ok(Self {
            host: domain.as_str().to_string(),
            any_subdomain,
        })
    }
}
