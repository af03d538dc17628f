//! Keyed secret storage with an at-most-one-reveal guarantee.
//!
//! The store is the only shared mutable resource in the system, so it owns
//! its concurrency control: the check-then-delete of a consume must be a
//! single atomic conditional mutation against the backing store, never a
//! read followed by a separate delete.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{init_db, DbPool, SqliteStore};

use crate::secret::{InvalidSecret, NewSecret};
use async_trait::async_trait;
use thiserror::Error;

/// Typed store outcomes; the service coalesces these into the public taxonomy
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown id, already consumed, or expired; deliberately one variant
    #[error("secret not found")]
    NotFound,

    #[error("challenge answer mismatch")]
    ChallengeMismatch,

    #[error("invalid secret: {0}")]
    InvalidSecret(#[from] InvalidSecret),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a first-contact consume attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Unchallenged secret: revealed and deleted in one atomic step
    Revealed(String),
    /// Challenged secret: prompt returned, nothing consumed
    ChallengeRequired(String),
}

/// Capability contract for secret storage backends.
///
/// All methods may block on backend I/O; callers must not hold any
/// in-process lock across a call.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Persist a new secret, assigning and returning its identifier.
    /// Timestamps are set here, at insertion.
    async fn create(&self, new: NewSecret) -> Result<String, StoreError>;

    /// Atomically check existence and expiry and, for an unchallenged
    /// secret, consume it. A challenged secret yields its prompt instead
    /// and stays pending.
    async fn consume_if_valid(&self, id: &str) -> Result<ConsumeOutcome, StoreError>;

    /// Atomically compare the stored answer and consume on match. On
    /// mismatch the secret remains available for further attempts until
    /// expiry. A secret with no challenge is consumable regardless of the
    /// supplied answer.
    async fn validate_and_consume(&self, id: &str, answer: &str) -> Result<String, StoreError>;

    /// Eagerly delete expired entries, returning how many were removed.
    /// Access-time checks already hide expired entries, so this only
    /// reclaims space.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}
