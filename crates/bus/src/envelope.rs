//! Wire envelope for bus messages.
//!
//! Every body is a JSON object of the form
//! `{"schema_version": 1, "event_type": "...", "payload": {...}}`.
//! The `event_type`/`payload` pair comes from an adjacently tagged enum
//! owned by the caller; this module only adds and checks the version.

use common::SCHEMA_VERSION;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{BusError, Result};

const VERSION_FIELD: &str = "schema_version";
const TYPE_FIELD: &str = "event_type";

/// Serializes a tagged message into an envelope body.
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(message)?;
    let Value::Object(map) = &mut value else {
        return Err(BusError::MalformedMessage(
            "message must serialize to a JSON object".to_string(),
        ));
    };
    map.insert(VERSION_FIELD.to_string(), Value::from(SCHEMA_VERSION));
    Ok(serde_json::to_vec(&value)?)
}

/// Parses an envelope body back into a tagged message.
///
/// Any failure is reported as malformed so the consumer dead-letters it.
pub fn decode<M: DeserializeOwned>(body: &[u8]) -> Result<M> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| BusError::MalformedMessage(format!("body is not valid JSON: {e}")))?;
    let Value::Object(mut map) = value else {
        return Err(BusError::MalformedMessage(
            "body is not a JSON object".to_string(),
        ));
    };

    let version = map
        .remove(VERSION_FIELD)
        .ok_or_else(|| BusError::MalformedMessage("missing schema_version".to_string()))?;
    let found = version
        .as_u64()
        .ok_or_else(|| BusError::MalformedMessage("schema_version is not an integer".to_string()))?;
    if found != u64::from(SCHEMA_VERSION) {
        return Err(BusError::UnsupportedSchemaVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    if !map.contains_key(TYPE_FIELD) {
        return Err(BusError::MalformedMessage("missing event_type".to_string()));
    }

    serde_json::from_value(Value::Object(map))
        .map_err(|e| BusError::MalformedMessage(e.to_string()))
}

/// Reads the `event_type` discriminator without decoding the payload.
pub fn peek_event_type(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get(TYPE_FIELD)?.as_str().map(str::to_string)
}
