//! Persisted queue-state layout and its versioned JSON envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutation::Mutation;

/// Version number for serialized [`QueueStateEnvelope`] payloads.
pub const QUEUE_FORMAT_VERSION: u16 = 1;

/// Errors encoding or decoding persisted queue state.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON for any known layout.
    #[error("queue state decode failed: {0}")]
    Json(#[from] serde_json::Error),
    /// Envelope carries a version this build cannot read.
    #[error("unsupported queue format version: {0}")]
    UnsupportedVersion(u16),
}

/// Versioned wrapper for stable on-disk decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStateEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Pending mutations, oldest first.
    pub mutations: Vec<Mutation>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u16,
    mutations: Vec<&'a Mutation>,
}

/// Encodes the pending sequence, oldest first.
pub fn encode_queue<'a, I>(mutations: I) -> Result<String, CodecError>
where
    I: IntoIterator<Item = &'a Mutation>,
{
    let env = EnvelopeRef {
        format_version: QUEUE_FORMAT_VERSION,
        mutations: mutations.into_iter().collect(),
    };
    Ok(serde_json::to_string(&env)?)
}

/// Decodes a persisted value.
///
/// Blank input is an empty queue.
pub fn decode_queue(raw: &str) -> Result<Vec<Mutation>, CodecError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Older clients stored the bare array.
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str::<Vec<Mutation>>(raw)?);
    }

    let env = serde_json::from_str::<QueueStateEnvelope>(raw)?;
    if env.format_version != QUEUE_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(env.format_version));
    }
    Ok(env.mutations)
}
