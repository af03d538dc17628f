use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::FromRow;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Construction-time invariant violations for a secret
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidSecret {
    #[error("secret text must not be empty")]
    EmptyText,

    #[error("challenge prompt and answer must be provided together")]
    PartialChallenge,
}

/// Optional prompt/answer pair gating a reveal.
///
/// Representable only as a complete pair; a prompt without an answer (or
/// vice versa) is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub prompt: String,
    pub answer: String,
}

impl Challenge {
    /// Build a challenge from optional transport-level parts.
    ///
    /// Empty strings count as absent. Returns `Ok(None)` when neither part
    /// is supplied.
    pub fn from_parts(
        prompt: Option<String>,
        answer: Option<String>,
    ) -> Result<Option<Self>, InvalidSecret> {
        let prompt = prompt.filter(|p| !p.is_empty());
        let answer = answer.filter(|a| !a.is_empty());
        match (prompt, answer) {
            (Some(prompt), Some(answer)) => Ok(Some(Self { prompt, answer })),
            (None, None) => Ok(None),
            _ => Err(InvalidSecret::PartialChallenge),
        }
    }

    /// Pure comparison; consumption is the store's responsibility.
    pub fn matches(&self, supplied: &str) -> bool {
        answer_matches(&self.answer, supplied)
    }
}

/// Case-sensitive, exact answer comparison. The SQLite backend performs the
/// same comparison in SQL (BINARY collation); the two must stay equivalent.
pub fn answer_matches(stored: &str, supplied: &str) -> bool {
    stored == supplied
}

/// Generate a 128-bit random identifier, URL-safe base64 encoded (22 chars,
/// no padding). The id is the sole access credential for an unchallenged
/// secret, so it must be unguessable.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A validated creation request, before the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub text: String,
    pub challenge: Option<Challenge>,
    /// Already clamped to the system ceiling by the service
    pub ttl: Duration,
}

impl NewSecret {
    pub fn check_invariants(&self) -> Result<(), InvalidSecret> {
        if self.text.is_empty() {
            return Err(InvalidSecret::EmptyText);
        }
        Ok(())
    }
}

/// One persisted secret. Immutable once created; the only lifecycle
/// transition is deletion, either by a successful consume or by expiry.
#[derive(Clone, FromRow, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    pub id: String,
    pub text: String,
    pub prompt: Option<String>,
    pub answer: Option<String>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Secret {
    /// Materialize a record: assign the identifier and derive the expiry
    /// instant from the creation timestamp.
    pub fn from_new(new: NewSecret, now: DateTime<Utc>) -> Self {
        let (prompt, answer) = match new.challenge {
            Some(c) => (Some(c.prompt), Some(c.answer)),
            None => (None, None),
        };
        Self {
            id: generate_id(),
            text: new.text,
            prompt,
            answer,
            created_at: now,
            expires_at: now + new.ttl,
        }
    }

    /// An entry whose window has passed behaves identically to "not found"
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn has_challenge(&self) -> bool {
        self.prompt.is_some()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("has_challenge", &self.has_challenge())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
