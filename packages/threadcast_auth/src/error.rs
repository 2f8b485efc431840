//! Error types for key handling and token issuance.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported token version: {0}")]
    UnsupportedVersion(u8),

    #[error("token expired")]
    Expired,

    #[error("connection id too long: {len} bytes (max 255)")]
    ConnectionIdTooLong { len: usize },
}

impl TokenError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::Malformed(_) => "malformed",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::Expired => "expired",
            Self::ConnectionIdTooLong { .. } => "connection_id_too_long",
        }
    }
}
