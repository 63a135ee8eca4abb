//! Codecs turning wire envelopes into raw queue payloads and back.

use crate::envelope::WireEnvelope;
use crate::error::SerializationError;

/// Converts envelopes to bytes for the raw queue client
pub trait MessageCodec: Send + Sync {
    /// Serialize an envelope
    fn encode(&self, envelope: &WireEnvelope) -> Result<Vec<u8>, SerializationError>;

    /// Deserialize an envelope; any failure is reported, never a partial envelope
    fn decode(&self, bytes: &[u8]) -> Result<WireEnvelope, SerializationError>;

    /// Get codec identifier
    fn codec_id(&self) -> &'static str;
}

/// JSON envelope codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, envelope: &WireEnvelope) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<WireEnvelope, SerializationError> {
        let text = std::str::from_utf8(bytes).map_err(|_| SerializationError::InvalidUtf8)?;
        Ok(serde_json::from_str(text)?)
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}
