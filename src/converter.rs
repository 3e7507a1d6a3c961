// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Body Conversion
//!
//! The template and listeners translate between payloads and message bodies
//! through a `MessageConverter`. JSON is used unless the configuration supplies
//! another converter.

use crate::errors::AmqpError;
use serde_json::Value;
use tracing::error;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Converts payloads to message bodies and back.
pub trait MessageConverter: Send + Sync {
    /// Content type set on outgoing messages.
    fn content_type(&self) -> &str;

    fn to_body(&self, payload: &Value) -> Result<Vec<u8>, AmqpError>;

    fn from_body(&self, body: &[u8]) -> Result<Value, AmqpError>;
}

/// Encodes payloads as JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageConverter;

impl MessageConverter for JsonMessageConverter {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn to_body(&self, payload: &Value) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::SerializePayloadError
        })
    }

    fn from_body(&self, body: &[u8]) -> Result<Value, AmqpError> {
        serde_json::from_slice(body).map_err(|err| {
            error!(error = err.to_string(), "failure to parse payload");
            AmqpError::ParsePayloadError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_is_compact() {
        let body = JsonMessageConverter
            .to_body(&json!({"event": "created"}))
            .unwrap();
        assert_eq!(body, br#"{"event":"created"}"#.to_vec());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert_eq!(
            JsonMessageConverter.from_body(b"not json"),
            Err(AmqpError::ParsePayloadError)
        );
    }
}
