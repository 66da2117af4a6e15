//! Caller access gate.
//!
//! The gateway only runs invocations that carry an [`Authorized`] proof.
//! Proofs come from [`AccessGate::authorize`] (shared-secret check) or from
//! [`Authorized::local_transport`] for the stdio transport, whose only peer is
//! the parent process that spawned the server.

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("access denied: no api_secret configured and allow_unauthenticated is off")]
    NotConfigured,

    #[error("access denied: missing token")]
    MissingToken,

    #[error("access denied: invalid token")]
    InvalidToken,
}

/// Proof that the caller passed the access gate.
#[derive(Debug, Clone, Copy)]
pub struct Authorized {
    _private: (),
}

impl Authorized {
    /// Proof for the stdio transport.
    pub fn local_transport() -> Self {
        Self { _private: () }
    }
}

/// Shared-secret gate. Denies everything when no secret is configured,
/// unless unauthenticated access was switched on explicitly.
#[derive(Clone)]
pub struct AccessGate {
    secret: Option<String>,
    allow_unauthenticated: bool,
}

impl AccessGate {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secret: config
                .api_secret
                .clone()
                .filter(|s| !s.trim().is_empty()),
            allow_unauthenticated: config.allow_unauthenticated,
        }
    }

    pub fn authorize(&self, presented: Option<&str>) -> Result<Authorized, AccessError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.allow_unauthenticated {
                tracing::warn!("no api_secret configured; allowing unauthenticated caller");
                return Ok(Authorized { _private: () });
            }
            return Err(AccessError::NotConfigured);
        };

        let presented = presented.ok_or(AccessError::MissingToken)?;
        if constant_time_eq(secret.as_bytes(), presented.as_bytes()) {
            Ok(Authorized { _private: () })
        } else {
            Err(AccessError::InvalidToken)
        }
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("secret_configured", &self.secret.is_some())
            .field("allow_unauthenticated", &self.allow_unauthenticated)
            .finish()
    }
}

/// Timing depends only on the secret's length, never on where or whether the
/// presented token differs.
fn constant_time_eq(secret: &[u8], presented: &[u8]) -> bool {
    let same_len = (secret.len() as u64).ct_eq(&(presented.len() as u64));
    let mut padded = vec![0u8; secret.len()];
    let overlap = secret.len().min(presented.len());
    padded[..overlap].copy_from_slice(&presented[..overlap]);
    bool::from(same_len & secret.ct_eq(padded.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_matching_secret_is_authorized() {
        let gate = AccessGate::from_config(&test_config());
        assert!(gate.authorize(Some("s3cret")).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_token_denied() {
        let gate = AccessGate::from_config(&test_config());
        assert_eq!(gate.authorize(Some("s3creT")).unwrap_err(), AccessError::InvalidToken);
        assert_eq!(gate.authorize(Some("s3cret!")).unwrap_err(), AccessError::InvalidToken);
        assert_eq!(gate.authorize(None).unwrap_err(), AccessError::MissingToken);
    }

    #[test]
    fn test_length_mismatch_denied() {
        let gate = AccessGate::from_config(&test_config());
        assert_eq!(gate.authorize(Some("s3c")).unwrap_err(), AccessError::InvalidToken);
        assert_eq!(gate.authorize(Some("")).unwrap_err(), AccessError::InvalidToken);
        assert_eq!(
            gate.authorize(Some("s3cret\0\0\0")).unwrap_err(),
            AccessError::InvalidToken
        );
    }

    #[test]
    fn test_compare_pads_short_input() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc\0", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_no_secret_fails_closed() {
        let mut config = test_config();
        config.api_secret = None;
        let gate = AccessGate::from_config(&config);
        assert_eq!(gate.authorize(Some("anything")).unwrap_err(), AccessError::NotConfigured);
        assert_eq!(gate.authorize(None).unwrap_err(), AccessError::NotConfigured);
    }

    #[test]
    fn test_empty_secret_counts_as_unconfigured() {
        let mut config = test_config();
        config.api_secret = Some("  ".to_string());
        let gate = AccessGate::from_config(&config);
        assert_eq!(gate.authorize(Some("  ")).unwrap_err(), AccessError::NotConfigured);
    }

    #[test]
    fn test_explicit_opt_in_allows_unauthenticated() {
        let mut config = test_config();
        config.api_secret = None;
        config.allow_unauthenticated = true;
        let gate = AccessGate::from_config(&config);
        assert!(gate.authorize(None).is_ok());
    }
}
