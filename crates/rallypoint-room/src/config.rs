//! Store limits and defaults.

use std::time::Duration;

use crate::StoreError;

/// Limits applied when rooms are created.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Join-code samples before giving up with `CodeGenerationExhausted`.
    pub max_code_attempts: u32,

    /// Room lifetime when the creator doesn't ask for one.
    pub default_ttl: Duration,

    /// Longest lifetime a creator may ask for. Longer requests are clamped.
    pub max_ttl: Duration,

    /// Seats (excluding the host) when the creator doesn't ask.
    pub default_max_members: u32,

    /// Upper bound on seats a creator may ask for.
    pub max_members_limit: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_code_attempts: 16,
            default_ttl: Duration::from_secs(4 * 60 * 60),
            max_ttl: Duration::from_secs(24 * 60 * 60),
            default_max_members: 8,
            max_members_limit: 64,
        }
    }
}

impl StoreConfig {
    /// Resolves a requested lifetime: default when absent, clamped to
    /// `max_ttl`, zero rejected.
    pub fn resolve_ttl(&self, requested: Option<Duration>) -> Result<Duration, StoreError> {
        match requested {
            None => Ok(self.default_ttl),
            Some(ttl) if ttl.is_zero() => {
                Err(StoreError::Validation("ttl must be positive".into()))
            }
            Some(ttl) => Ok(ttl.min(self.max_ttl)),
        }
    }

    /// Resolves a requested seat count: default when absent, must be
    /// within `1..=max_members_limit`.
    pub fn resolve_max_members(&self, requested: Option<u32>) -> Result<u32, StoreError> {
        let max = requested.unwrap_or(self.default_max_members);
        if max == 0 || max > self.max_members_limit {
            return Err(StoreError::Validation(format!(
                "max_members must be between 1 and {}",
                self.max_members_limit
            )));
        }
        Ok(max)
    }
}
