use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use json_store_adapter::db::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accounts are identified by the name the user registered with
pub type UserId = String;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Username already exists")]
    DuplicateIdentity,
    #[error("User not found")]
    UnknownIdentity,
    #[error("Invalid password")]
    InvalidCredential,
    #[error("Portfolio not found")]
    PortfolioNotFound,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Database error: {0}")]
    DbError(#[from] DbError),
}

/// Stored login secret of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// PHC string of the Argon2id hash, salt included
    pub hashed_password: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Argon2id cost settings used when hashing new passwords.
///
/// Verification reads the parameters from the stored hash, so changing
/// these does not invalidate existing credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHasher {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl CredentialHasher {
    /// Cheapest settings Argon2 accepts, for tests
    #[must_use]
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| AuthError::Hashing(format!("invalid Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash `secret` with a fresh random salt
    /// # Errors
    /// Returns `AuthError::Hashing` if the parameters are invalid or hashing fails
    pub fn hash(&self, secret: &str) -> Result<Credential, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon2()?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        Ok(Credential {
            hashed_password,
            created_at: Utc::now(),
        })
    }

    /// [`hash`](Self::hash) on the blocking pool, keeping Argon2 off the async workers
    /// # Errors
    /// Returns `AuthError::Hashing` if hashing fails or the task is lost
    pub async fn spawn_hash(self, secret: String) -> Result<Credential, AuthError> {
        tokio::task::spawn_blocking(move || self.hash(&secret))
            .await
            .map_err(|e| AuthError::Hashing(format!("hashing task failed: {e}")))?
    }
}

impl Credential {
    /// Check `secret` against the stored hash in constant time
    /// # Errors
    /// - `AuthError::InvalidCredential` if the secret does not match
    /// - `AuthError::Hashing` if the stored hash cannot be parsed
    pub fn verify(&self, secret: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(&self.hashed_password)
            .map_err(|e| AuthError::Hashing(format!("stored hash is unreadable: {e}")))?;
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .map_err(|e| match e {
                argon2::password_hash::Error::Password => AuthError::InvalidCredential,
                other => AuthError::Hashing(other.to_string()),
            })
    }

    /// [`verify`](Self::verify) on the blocking pool
    /// # Errors
    /// Same as `verify`, plus `AuthError::Hashing` if the task is lost
    pub async fn spawn_verify(self, secret: String) -> Result<(), AuthError> {
        tokio::task::spawn_blocking(move || self.verify(&secret))
            .await
            .map_err(|e| AuthError::Hashing(format!("verification task failed: {e}")))?
    }
}

/// Accounts are looked up by their name without surrounding whitespace
pub(crate) fn normalise_identity(identity: &str) -> UserId {
    identity.trim().to_string()
}

/// Check the identity/secret pair sent by a client. The identity is trimmed,
/// the secret is kept exactly as typed.
pub(crate) fn normalise_login(identity: &str, secret: &str) -> Result<(UserId, String), AuthError> {
    let identity = normalise_identity(identity);
    if identity.is_empty() || secret.trim().is_empty() {
        return Err(AuthError::InvalidRequest(
            "Username and password are required.".to_string(),
        ));
    }
    Ok((identity, secret.to_string()))
}
