//! Server identity: the persistent ed25519 key that signs correlation tokens.
//!
//! Tokens minted before a restart keep verifying after it, as long as they
//! have not expired.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use threadcast_auth::{PublicKey, SigningKey, TokenIssuer};
use tracing::info;

pub struct ServerIdentity {
    signing_key: SigningKey,
    pub public_key: PublicKey,
}

const KEY_FILE: &str = "identity.key";
const KEY_LEN: usize = 32;

impl ServerIdentity {
    /// Load from `<data_dir>/identity.key`, or generate and save a new key.
    pub fn load_or_generate(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(KEY_FILE);

        if path.exists() {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read identity key: {}", path.display()))?;
            let seed: [u8; KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
                anyhow::anyhow!("identity key must be {} bytes, got {}", KEY_LEN, v.len())
            })?;
            let identity = Self::from_signing_key(SigningKey::from_bytes(seed));
            info!(fingerprint = %identity.public_key.fingerprint(), "loaded server identity");
            Ok(identity)
        } else {
            let identity = Self::from_signing_key(SigningKey::generate(&mut rand::rng()));
            identity.save(&path)?;
            info!(fingerprint = %identity.public_key.fingerprint(), "generated server identity");
            Ok(identity)
        }
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key.public_key();
        Self {
            signing_key,
            public_key,
        }
    }

    /// A token issuer signing with this identity.
    pub fn token_issuer(&self, ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(self.signing_key.clone(), ttl)
    }

    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.signing_key.to_bytes())
            .with_context(|| format!("failed to write identity key: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }
}
