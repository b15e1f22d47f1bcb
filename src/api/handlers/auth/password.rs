//! Argon2id password hashing.
//!
//! Digests are PHC strings, so salt and cost travel with the hash and
//! verification never needs out-of-band parameters.

use argon2::{
    password_hash::{self, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use rand::{rngs::OsRng, RngCore};

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("password must not be empty")]
    Empty,
    #[error("stored password digest is malformed")]
    Malformed,
    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("password hashing failed: {0}")]
    Hash(password_hash::Error),
    #[error("failed to generate salt")]
    Salt,
}

/// Hashes and verifies passwords with a fixed cost per deployment.
#[derive(Clone, Debug)]
pub struct Hasher {
    params: Params,
}

impl Default for Hasher {
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

impl Hasher {
    /// Custom cost: memory in KiB, iterations, lanes.
    ///
    /// # Errors
    /// Returns `HashError::Params` when argon2 rejects the combination.
    pub fn with_cost(memory_kib: u32, iterations: u32, lanes: u32) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, lanes, None).map_err(HashError::Params)?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password into a PHC digest.
    ///
    /// # Errors
    /// `HashError::Empty` for an empty password, `HashError::Hash` if argon2 fails.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        if password.is_empty() {
            return Err(HashError::Empty);
        }
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| HashError::Salt)?;
        let salt = SaltString::encode_b64(&bytes).map_err(HashError::Hash)?;
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(HashError::Hash)
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// A mismatch is `Ok(false)`; only an unreadable digest is an error.
    ///
    /// # Errors
    /// `HashError::Malformed` when `digest` is not a PHC string.
    pub fn verify(&self, digest: &str, password: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashError::Malformed)?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashError::Hash(err)),
        }
    }
}

/// Hash on the blocking pool so argon2 never stalls the async workers.
pub(crate) async fn hash_off_thread(hasher: &Hasher, password: &str) -> anyhow::Result<String> {
    let hasher = hasher.clone();
    let password = password.to_string();
    let digest = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;
    Ok(digest)
}
