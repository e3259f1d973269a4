//! Room password verification

use std::ops::RangeInclusive;
use std::sync::Arc;

/// Work factors bcrypt accepts
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;

const DECOY_PASSWORD: &str = "anzen-decoy-password";

/// Password hashing error
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("bcrypt cost {0} outside 4..=31")]
    InvalidCost(u32),
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hash primitive the gate delegates to
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashError>;
    fn verify(&self, plain: &str, digest: &str) -> Result<bool, HashError>;
}

/// bcrypt with a fixed work factor
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Result<Self, HashError> {
        if !BCRYPT_COST_RANGE.contains(&cost) {
            return Err(HashError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, HashError> {
        Ok(bcrypt::hash(plain, self.cost)?)
    }

    fn verify(&self, plain: &str, digest: &str) -> Result<bool, HashError> {
        Ok(bcrypt::verify(plain, digest)?)
    }
}

/// Validates room access attempts.
///
/// Hashing is CPU-bound, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct AuthGate {
    hasher: Arc<dyn PasswordHasher>,
    /// Verified against when the room does not exist, so both failure
    /// paths cost the same.
    decoy: Arc<str>,
}

impl AuthGate {
    /// Builds the gate, hashing the decoy on the blocking pool.
    pub async fn prepare(hasher: Arc<dyn PasswordHasher>) -> Result<Self, HashError> {
        let decoy_hasher = hasher.clone();
        let decoy = tokio::task::spawn_blocking(move || decoy_hasher.hash(DECOY_PASSWORD)).await??;
        Ok(Self {
            hasher,
            decoy: Arc::from(decoy),
        })
    }

    /// `true` only if `password` matches `stored_hash`. Faults are `false`.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();

        let result = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(HashError::from)
            .and_then(|verified| verified);

        match result {
            Ok(verified) => verified,
            Err(e) => {
                tracing::debug!(error = %e, "Password verification fault");
                false
            }
        }
    }

    /// Checks a password against an optional stored hash. A missing hash is
    /// always `false` but still pays for one verification.
    pub async fn check(&self, password: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(stored_hash) => self.verify(password, stored_hash).await,
            None => {
                self.verify(password, &self.decoy).await;
                false
            }
        }
    }

    /// Hashes a new room password.
    pub async fn hash(&self, password: &str) -> Result<String, HashError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }
}
