//! The persisted domain configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{host_matches, Domain, BUILTIN_DOMAINS};

/// Storage key holding the domain configuration.
pub const DOMAIN_CONFIG_KEY: &str = "customDomains";

/// User-managed domain list, in the order the user added them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub custom_domains: Vec<Domain>,
}

/// Wire shape of the stored value, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredDomainConfig {
    custom_domains: Vec<String>,
}

impl DomainConfig {
    /// Builds a config from stored JSON, dropping entries that are not valid
    /// domains. A missing value yields the empty config.
    pub fn from_stored(value: Option<&serde_json::Value>) -> serde_json::Result<Self> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let stored = StoredDomainConfig::deserialize(value)?;

        let mut custom_domains: Vec<Domain> = Vec::with_capacity(stored.custom_domains.len());
        for raw in stored.custom_domains {
            match Domain::parse(&raw) {
                Some(domain) if !custom_domains.contains(&domain) => custom_domains.push(domain),
                Some(domain) => warn!(domain = %domain, "Ignoring duplicate stored domain"),
                None => warn!(entry = %raw, "Ignoring invalid stored domain"),
            }
        }

        Ok(Self { custom_domains })
    }

    /// Serializes to the stored JSON shape.
    pub fn to_stored(&self) -> serde_json::Value {
        serde_json::json!({
            "customDomains": self.custom_domains.iter().map(Domain::as_str).collect::<Vec<_>>(),
        })
    }

    /// Returns true if `domain` is in the custom list.
    pub fn contains(&self, domain: &Domain) -> bool {
        self.custom_domains.contains(domain)
    }

    /// Returns true if `host` is a custom domain or a subdomain of one.
    pub fn covers_host(&self, host: &str) -> bool {
        self.custom_domains.iter().any(|d| d.covers_host(host))
    }

    /// Returns true if `host` falls under a built-in or a custom domain.
    pub fn is_supported_host(&self, host: &str) -> bool {
        BUILTIN_DOMAINS.iter().any(|b| host_matches(host, b)) || self.covers_host(host)
    }
}
