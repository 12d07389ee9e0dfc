//! Optional API keys for the enrichment stages
//!
//! Keys are read once at batch start and threaded through to the stages
//! explicitly. A missing key is never an error.

use std::fmt;

/// Geocoding service API key
pub const GEO_API_KEY_VAR: &str = "GEO_API_KEY";
/// UMLS terminology service API key
pub const UMLS_API_KEY_VAR: &str = "UMLS_API_KEY";

/// An external service secret
#[derive(Clone, PartialEq, Eq)]
pub struct EnrichmentCredential(String);

impl EnrichmentCredential {
    /// Wrap a secret; blank values count as absent
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EnrichmentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnrichmentCredential(***)")
    }
}

/// Credentials for both enrichment stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub geo: Option<EnrichmentCredential>,
    pub vocabulary: Option<EnrichmentCredential>,
}

impl Credentials {
    /// No credentials: geo runs degraded, vocabulary is skipped
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Resolve credentials through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            geo: lookup(GEO_API_KEY_VAR).and_then(EnrichmentCredential::new),
            vocabulary: lookup(UMLS_API_KEY_VAR).and_then(EnrichmentCredential::new),
        }
    }

    /// Resolve credentials from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn with_geo(mut self, secret: impl Into<String>) -> Self {
        self.geo = EnrichmentCredential::new(secret);
        self
    }

    #[must_use]
    pub fn with_vocabulary(mut self, secret: impl Into<String>) -> Self {
        self.vocabulary = EnrichmentCredential::new(secret);
        self
    }
}
