//! Correlation token: a signed, expiring credential naming one live connection.
//!
//! ## Wire format
//! ```text
//! [1B version=1]
//! [8B expires_at]        unix seconds, big-endian
//! [1B id_len]            length of the connection id (0-255)
//! [id_len B id]          UTF-8
//! [64B signature]        ed25519 over all preceding bytes
//! ```
//!
//! The bytes are sent as URL-safe unpadded base64. A token is only ever
//! interpreted by the process that minted it, so the verifying key is the
//! issuer's own public key and no shared mutable state is involved.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::encoding::{base64_decode, base64_encode};
use crate::error::TokenError;
use crate::keys::{self, PublicKey, SIGNATURE_LEN, Signature, SigningKey};

const VERSION_V1: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 1;

/// Seconds since the unix epoch, saturating to 0 for clocks set before 1970.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The signed portion of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub connection_id: String,
    pub expires_at: u64,
}

impl TokenClaims {
    fn signable_bytes(&self) -> Result<Vec<u8>, TokenError> {
        let id = self.connection_id.as_bytes();
        let id_len: u8 = id
            .len()
            .try_into()
            .map_err(|_| TokenError::ConnectionIdTooLong { len: id.len() })?;

        let mut buf = Vec::with_capacity(HEADER_LEN + id.len() + SIGNATURE_LEN);
        buf.push(VERSION_V1);
        buf.extend_from_slice(&self.expires_at.to_be_bytes());
        buf.push(id_len);
        buf.extend_from_slice(id);
        Ok(buf)
    }

    /// Split raw token bytes into claims, the signed prefix, and the signature.
    fn decode(bytes: &[u8]) -> Result<(Self, &[u8], Signature), TokenError> {
        if bytes.len() < HEADER_LEN + SIGNATURE_LEN {
            return Err(TokenError::Malformed(format!(
                "token too short: {} bytes (min {})",
                bytes.len(),
                HEADER_LEN + SIGNATURE_LEN
            )));
        }
        if bytes[0] != VERSION_V1 {
            return Err(TokenError::UnsupportedVersion(bytes[0]));
        }

        let mut expires = [0u8; 8];
        expires.copy_from_slice(&bytes[1..9]);
        let expires_at = u64::from_be_bytes(expires);

        let id_len = bytes[9] as usize;
        let signed_len = HEADER_LEN + id_len;
        if bytes.len() != signed_len + SIGNATURE_LEN {
            return Err(TokenError::Malformed(format!(
                "length mismatch for id_len={id_len}: {} bytes (need {})",
                bytes.len(),
                signed_len + SIGNATURE_LEN
            )));
        }

        let connection_id = std::str::from_utf8(&bytes[HEADER_LEN..signed_len])
            .map_err(|e| TokenError::Malformed(format!("invalid connection id: {e}")))?
            .to_string();

        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(&bytes[signed_len..]);

        Ok((
            Self {
                connection_id,
                expires_at,
            },
            &bytes[..signed_len],
            Signature::from_bytes(&sig),
        ))
    }
}

/// Verifies tokens against a fixed public key.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    public_key: PublicKey,
}

impl TokenVerifier {
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Connection id the token was minted for, or `None` if it is malformed,
    /// mis-signed, or expired.
    pub fn verify(&self, token: &str) -> Option<String> {
        self.verify_at(token, unix_now())
    }

    pub fn verify_at(&self, token: &str, now: u64) -> Option<String> {
        self.check_at(token, now).ok()
    }

    /// Like [`verify_at`](Self::verify_at) but reports why a token was refused.
    pub fn check_at(&self, token: &str, now: u64) -> Result<String, TokenError> {
        let bytes = base64_decode(token.trim())
            .map_err(|e| TokenError::Malformed(format!("base64 decode: {e}")))?;
        let (claims, signed, signature) = TokenClaims::decode(&bytes)?;
        keys::verify(&self.public_key, signed, &signature)?;
        if now >= claims.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(claims.connection_id)
    }
}

/// Mints tokens with a fixed signing key and lifetime.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    signing_key: SigningKey,
    verifier: TokenVerifier,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(signing_key: SigningKey, ttl: Duration) -> Self {
        let verifier = TokenVerifier::new(signing_key.public_key());
        Self {
            signing_key,
            verifier,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn verifier(&self) -> TokenVerifier {
        self.verifier.clone()
    }

    pub fn mint(&self, connection_id: &str) -> Result<String, TokenError> {
        self.mint_at(connection_id, unix_now())
    }

    pub fn mint_at(&self, connection_id: &str, now: u64) -> Result<String, TokenError> {
        let claims = TokenClaims {
            connection_id: connection_id.to_string(),
            expires_at: now.saturating_add(self.ttl.as_secs()),
        };
        let mut bytes = claims.signable_bytes()?;
        let signature = self.signing_key.sign(&bytes);
        bytes.extend_from_slice(&signature.to_bytes());
        Ok(base64_encode(&bytes))
    }

    pub fn verify(&self, token: &str) -> Option<String> {
        self.verifier.verify(token)
    }

    pub fn verify_at(&self, token: &str, now: u64) -> Option<String> {
        self.verifier.verify_at(token, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_750_000_000;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SigningKey::from_bytes([9u8; 32]), Duration::from_secs(3600))
    }

    fn raw(token: &str) -> Vec<u8> {
        base64_decode(token).unwrap()
    }

    #[test]
    fn mint_then_verify_returns_connection_id() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        assert_eq!(issuer.verify_at(&token, NOW).as_deref(), Some("conn-1"));
        assert_eq!(issuer.verify_at(&token, NOW + 3599).as_deref(), Some("conn-1"));
    }

    #[test]
    fn mint_uses_wall_clock() {
        let issuer = issuer();
        let token = issuer.mint("conn-live").unwrap();
        assert_eq!(issuer.verify(&token).as_deref(), Some("conn-live"));
    }

    #[test]
    fn wire_layout() {
        let token = issuer().mint_at("abc", NOW).unwrap();
        let bytes = raw(&token);
        assert_eq!(bytes.len(), HEADER_LEN + 3 + SIGNATURE_LEN);
        assert_eq!(bytes[0], VERSION_V1);
        assert_eq!(u64::from_be_bytes(bytes[1..9].try_into().unwrap()), NOW + 3600);
        assert_eq!(bytes[9], 3);
        assert_eq!(&bytes[10..13], b"abc");
    }

    #[test]
    fn expired_token_is_invalid() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        assert!(issuer.verify_at(&token, NOW + 3600).is_none());
        assert_eq!(
            issuer.verifier().check_at(&token, NOW + 7200),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let issuer = TokenIssuer::new(SigningKey::from_bytes([1u8; 32]), Duration::ZERO);
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        assert!(issuer.verify_at(&token, NOW).is_none());
    }

    #[test]
    fn tampered_id_fails_signature() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        let mut bytes = raw(&token);
        bytes[HEADER_LEN] = b'X';
        let forged = base64_encode(&bytes);
        assert_eq!(
            issuer.verifier().check_at(&forged, NOW),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn extended_expiry_fails_signature() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        let mut bytes = raw(&token);
        bytes[1..9].copy_from_slice(&u64::MAX.to_be_bytes());
        let forged = base64_encode(&bytes);
        assert!(issuer.verify_at(&forged, NOW + 10_000).is_none());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let ours = issuer();
        let theirs = TokenIssuer::new(SigningKey::from_bytes([2u8; 32]), Duration::from_secs(60));
        let token = theirs.mint_at("conn-1", NOW).unwrap();
        assert!(ours.verify_at(&token, NOW).is_none());
    }

    #[test]
    fn garbage_never_panics() {
        let verifier = issuer().verifier();
        for input in ["", "!!!", "AAAA", "not a token at all", "AQ"] {
            assert!(verifier.verify_at(input, NOW).is_none(), "{input:?}");
        }
    }

    #[test]
    fn truncated_token_is_malformed() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        let bytes = raw(&token);
        let short = base64_encode(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            issuer.verifier().check_at(&short, NOW),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let issuer = issuer();
        let mut bytes = raw(&issuer.mint_at("c", NOW).unwrap());
        bytes[0] = 7;
        assert_eq!(
            issuer.verifier().check_at(&base64_encode(&bytes), NOW),
            Err(TokenError::UnsupportedVersion(7))
        );
    }

    #[test]
    fn connection_id_too_long() {
        let long = "x".repeat(256);
        assert_eq!(
            issuer().mint_at(&long, NOW),
            Err(TokenError::ConnectionIdTooLong { len: 256 })
        );
        assert!(issuer().mint_at(&"x".repeat(255), NOW).is_ok());
    }

    #[test]
    fn distinct_connections_get_distinct_tokens() {
        let issuer = issuer();
        let a = issuer.mint_at("conn-a", NOW).unwrap();
        let b = issuer.mint_at("conn-b", NOW).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let issuer = issuer();
        let token = issuer.mint_at("conn-1", NOW).unwrap();
        let padded = format!("  {token}\n");
        assert_eq!(issuer.verify_at(&padded, NOW).as_deref(), Some("conn-1"));
    }
}
