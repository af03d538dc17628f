use crate::secret::{NewSecret, Secret};
use crate::store::{ConsumeOutcome, SecretStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

/// In-memory secret storage for tests and single-process deployments.
///
/// `DashMap::remove_if` evaluates its predicate under the entry's shard
/// lock, which makes the check-and-delete of a consume atomic per entry.
/// Entries are zeroized on drop, so a consumed or purged secret leaves no
/// copy behind in RAM.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Secret>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn create(&self, new: NewSecret) -> Result<String, StoreError> {
        new.check_invariants()?;
        let secret = Secret::from_new(new, Utc::now());
        let id = secret.id.clone();
        self.entries.insert(id.clone(), secret);
        Ok(id)
    }

    async fn consume_if_valid(&self, id: &str) -> Result<ConsumeOutcome, StoreError> {
        let now = Utc::now();

        // Lazy expiry: an expired entry is dropped on first touch
        self.entries.remove_if(id, |_, s| s.is_expired(now));

        if let Some(entry) = self.entries.get(id) {
            if let Some(prompt) = entry.prompt.clone() {
                return Ok(ConsumeOutcome::ChallengeRequired(prompt));
            }
        }

        match self
            .entries
            .remove_if(id, |_, s| s.answer.is_none() && !s.is_expired(now))
        {
            Some((_, secret)) => Ok(ConsumeOutcome::Revealed(secret.text.clone())),
            None => Err(StoreError::NotFound),
        }
    }

    async fn validate_and_consume(&self, id: &str, answer: &str) -> Result<String, StoreError> {
        let now = Utc::now();

        let removed = self.entries.remove_if(id, |_, s| {
            !s.is_expired(now)
                && s.answer
                    .as_deref()
                    .map_or(true, |stored| crate::secret::answer_matches(stored, answer))
        });

        if let Some((_, secret)) = removed {
            return Ok(secret.text.clone());
        }

        let pending = self
            .entries
            .get(id)
            .map_or(false, |entry| !entry.is_expired(now));

        if pending {
            Err(StoreError::ChallengeMismatch)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect();

        let mut purged = 0;
        for key in expired {
            if self.entries.remove_if(&key, |_, s| s.is_expired(now)).is_some() {
                purged += 1;
            }
        }

        Ok(purged)
    }
}
