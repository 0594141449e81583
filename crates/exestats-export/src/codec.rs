use serde::{Deserialize, Serialize};
use thiserror::Error;

use exestats_types::{BlockType, ExeBlockData};

/// Schema tag carried by every payload. Bump on incompatible changes.
pub const SCHEMA: &str = "exestats/exe-block-data/v1";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },
}

/// Envelope published for one finished block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub schema: String,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    pub data: ExeBlockData,
}

impl StatsPayload {
    pub fn new(block_number: u64, block_type: Option<BlockType>, data: ExeBlockData) -> Self {
        Self {
            schema: SCHEMA.to_string(),
            block_number,
            block_type,
            data,
        }
    }
}

pub fn encode_payload(payload: &StatsPayload) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Decodes and checks the schema tag.
pub fn decode_payload(bytes: &[u8]) -> Result<StatsPayload, CodecError> {
    let payload: StatsPayload = serde_json::from_slice(bytes)?;
    if payload.schema != SCHEMA {
        return Err(CodecError::SchemaMismatch {
            expected: SCHEMA.to_string(),
            found: payload.schema,
        });
    }
    Ok(payload)
}

/// Broker message key: the decimal block number.
pub fn message_key(block_number: u64) -> Vec<u8> {
    block_number.to_string().into_bytes()
}
