//! API request and response models.

use serde::{Deserialize, Serialize};

/// Response body for GET /api/domains.
#[derive(Debug, Serialize, Deserialize)]
pub struct DomainsResponse {
    /// Built-in domains, in shipped order.
    pub builtin: Vec<String>,
    /// Custom domains, in insertion order.
    pub custom: Vec<String>,
}

/// Request body for POST /api/domains.
#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    /// Raw user input; normalized by the gate.
    pub domain: String,
}

/// Query for GET /api/check.
#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub url: String,
}

/// Response body for GET /api/check.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub url: String,
    /// Host falls under a built-in or custom domain.
    pub supported: bool,
    /// Host falls under a custom domain.
    pub custom: bool,
}
