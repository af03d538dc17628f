use crate::config::SecretsConfig;
use crate::error::{AppError, AppResult};
use crate::secret::{Challenge, NewSecret};
use crate::store::{ConsumeOutcome, SecretStore};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

/// A creation request as it arrives from a transport adapter
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub text: String,
    pub prompt: Option<String>,
    pub answer: Option<String>,
    pub expire_in_secs: Option<u64>,
}

/// Creation receipt returned to the producer
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmittedSecret {
    pub id: String,
    /// Effective TTL after clamping to the system ceiling
    pub expires_in_secs: u64,
}

/// Result of an access attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    Revealed { text: String },
    ChallengeRequired { prompt: String },
}

/// Secret lifecycle orchestrator.
///
/// Stateless besides the store handle: validates input shape, applies the
/// TTL policy, delegates to the store, and coalesces store outcomes into
/// the public error taxonomy. Storage errors are not retried here.
pub struct SecretService {
    store: Arc<dyn SecretStore>,
    max_text_length: usize,
    max_ttl_secs: u64,
}

impl SecretService {
    pub fn new(store: Arc<dyn SecretStore>, config: &SecretsConfig) -> Self {
        Self {
            store,
            max_text_length: config.max_text_length,
            max_ttl_secs: config.max_ttl_secs,
        }
    }

    /// Validate and persist a new secret, returning its identifier.
    ///
    /// Safe to invoke more than once for the same logical request: every
    /// invocation creates an independent secret under a fresh id, so
    /// duplicate deliveries from an at-least-once producer are harmless.
    pub async fn submit(&self, request: SubmitRequest) -> AppResult<SubmittedSecret> {
        if request.text.is_empty() {
            return Err(AppError::validation("secret text must not be empty"));
        }
        if request.text.chars().count() > self.max_text_length {
            return Err(AppError::validation(format!(
                "secret text exceeds {} characters",
                self.max_text_length
            )));
        }

        let challenge = Challenge::from_parts(request.prompt, request.answer)
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let has_challenge = challenge.is_some();

        let ttl_secs = request
            .expire_in_secs
            .map_or(self.max_ttl_secs, |secs| secs.min(self.max_ttl_secs));

        let new = NewSecret {
            text: request.text,
            challenge,
            ttl: Duration::seconds(ttl_secs as i64),
        };

        let id = self.store.create(new).await?;
        info!(id = %id, has_challenge, ttl_secs, "Secret created");

        Ok(SubmittedSecret {
            id,
            expires_in_secs: ttl_secs,
        })
    }

    /// Attempt a reveal.
    ///
    /// Without an answer, a challenged secret yields its prompt and stays
    /// pending; an unchallenged one is atomically consumed. With an answer,
    /// the store validates and consumes in one step. Unknown, consumed, and
    /// expired ids are indistinguishable to the caller.
    pub async fn access(&self, id: &str, answer: Option<&str>) -> AppResult<AccessOutcome> {
        let outcome = match answer {
            Some(answer) => {
                let text = self.store.validate_and_consume(id, answer).await?;
                AccessOutcome::Revealed { text }
            }
            None => match self.store.consume_if_valid(id).await? {
                ConsumeOutcome::Revealed(text) => AccessOutcome::Revealed { text },
                ConsumeOutcome::ChallengeRequired(prompt) => {
                    AccessOutcome::ChallengeRequired { prompt }
                }
            },
        };

        match &outcome {
            AccessOutcome::Revealed { .. } => info!(id, "Secret revealed and consumed"),
            AccessOutcome::ChallengeRequired { .. } => {
                debug!(id, "Challenge required, secret untouched")
            }
        }
        Ok(outcome)
    }
}
