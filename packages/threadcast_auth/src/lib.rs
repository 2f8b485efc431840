//! Signing keys and correlation tokens for threadcast live connections.

pub mod encoding;
pub mod error;
pub mod keys;
pub mod token;

pub use error::TokenError;
pub use keys::{PublicKey, Signature, SigningKey};
pub use token::{TokenIssuer, TokenVerifier};
