//! Salted, non-reversible tokens for PHI values

use std::fmt;

use sha2::{Digest, Sha256};

/// Prefix of every token
pub const TOKEN_PREFIX: &str = "tok_";
const TOKEN_HEX_LEN: usize = 16;

/// Per-run tokenization salt
///
/// The same value and salt always give the same token. A fixed salt gives
/// identical tokens across runs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSalt(Vec<u8>);

impl TokenSalt {
    #[must_use]
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self(salt.as_ref().to_vec())
    }

    /// A random salt for a single run
    #[must_use]
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(bytes.to_vec())
    }

    /// Use the configured salt, or a random one when none is set
    #[must_use]
    pub fn from_config(salt: Option<&str>) -> Self {
        salt.map_or_else(Self::random, Self::new)
    }

    /// `tok_` followed by the first 16 hex digits of `sha256(salt || 0x1f || value)`
    #[must_use]
    pub fn token(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update([0x1f]);
        hasher.update(value.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{TOKEN_PREFIX}{}", &digest[..TOKEN_HEX_LEN])
    }
}

impl fmt::Debug for TokenSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSalt(***)")
    }
}
