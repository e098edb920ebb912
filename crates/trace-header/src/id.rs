//! Trace id generation.
//!
//! A token is 16 bytes from an [`EntropySource`] rendered as 32 lowercase hex
//! characters. The bytes are used verbatim, so tokens are UUID-shaped but carry
//! no version or variant bits.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::error::EntropyError;

/// Number of random bytes behind every token.
pub const TOKEN_BYTES: usize = 16;

/// Source of random bytes handed to the injector.
pub trait EntropySource: Send + Sync + 'static {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError(e.to_string()))
    }
}

/// Read one token's worth of bytes and render them as lowercase hex.
pub fn generate_token(source: &dyn EntropySource) -> Result<String, EntropyError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    source.fill(&mut bytes)?;
    Ok(format_token(bytes))
}

/// 4-2-2-2-6 byte groups joined without separators.
fn format_token(bytes: [u8; TOKEN_BYTES]) -> String {
    Uuid::from_bytes(bytes).simple().to_string()
}

/// Produces `prefix + token` identifiers.
#[derive(Clone)]
pub struct IdGenerator {
    prefix: String,
    source: Arc<dyn EntropySource>,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>, source: Arc<dyn EntropySource>) -> Self {
        Self {
            prefix: prefix.into(),
            source,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self) -> Result<String, EntropyError> {
        let token = generate_token(self.source.as_ref())?;
        Ok(format!("{}{token}", self.prefix))
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
