//! Mutation record and the typed-payload bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{EpochMillis, MutationId, RetryCount};

/// Errors turning a stored mutation back into a typed variant.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `type` tag is not part of the known variant set.
    #[error("unknown mutation type: {0}")]
    UnknownType(String),
    /// The tag is known but the payload does not match its schema.
    #[error("invalid payload for {kind}: {source}")]
    Payload {
        /// Mutation type tag.
        kind: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// One deferred write captured as data.
///
/// Field names on the wire are camelCase so persisted queues stay readable by
/// other clients sharing the same layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Unique id, generated at enqueue.
    pub id: MutationId,
    /// Opaque operation tag, meaningful only to the processor.
    #[serde(rename = "type")]
    pub kind: String,
    /// Data needed to replay the operation.
    pub payload: Value,
    /// Enqueue timestamp. Diagnostics only; ordering is queue position.
    pub created_at: EpochMillis,
    /// Failed attempts so far.
    #[serde(default)]
    pub retry_count: RetryCount,
    /// Timestamp of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<EpochMillis>,
}

impl Mutation {
    /// Builds a fresh mutation with `retry_count = 0`.
    pub fn new(kind: impl Into<String>, payload: Value, created_at: EpochMillis) -> Self {
        Self {
            id: MutationId::new(),
            kind: kind.into(),
            payload,
            created_at,
            retry_count: 0,
            last_attempt_at: None,
        }
    }

    /// Builds a mutation from a typed variant.
    pub fn from_kind<K: MutationKind>(value: &K, created_at: EpochMillis) -> serde_json::Result<Self> {
        Ok(Self::new(value.kind(), value.to_payload()?, created_at))
    }

    /// Decodes this mutation into the typed variant set `K`.
    pub fn decode<K: MutationKind>(&self) -> Result<K, DecodeError> {
        K::from_parts(&self.kind, self.payload.clone())
    }
}

/// A closed set of mutation variants keyed by their `type` tag.
///
/// Implementations must be total over their known tags and return
/// [`DecodeError::UnknownType`] for anything else.
pub trait MutationKind: Sized {
    /// Tag stored in [`Mutation::kind`].
    fn kind(&self) -> &'static str;
    /// Serializes the variant's payload.
    fn to_payload(&self) -> serde_json::Result<Value>;
    /// Rebuilds a variant from its tag and payload.
    fn from_parts(kind: &str, payload: Value) -> Result<Self, DecodeError>;
}

/// Deserializes `payload` as `T`, attributing failures to `kind`.
pub fn decode_payload<T>(kind: &str, payload: Value) -> Result<T, DecodeError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload {
        kind: kind.to_string(),
        source,
    })
}
