//! Report payload composition
//!
//! Combines the immutable [`Draft`] with a single [`Event`] into the JSON
//! document posted to the collection endpoint. Composition is pure: the
//! same draft and event always produce the same bytes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Draft, Event};

/// Errors raised while composing a report payload
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The composed document could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    /// The draft does not have the expected shape
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        PayloadError::Encode(err.to_string())
    }
}

/// Turns a draft and an event into request body bytes.
pub trait PayloadBuilder: Send + Sync {
    fn compose(&self, draft: &Draft, event: &Event) -> Result<Vec<u8>, PayloadError>;
}

/// Default builder producing the `{"access_token", "data"}` document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadBuilder;

impl PayloadBuilder for JsonPayloadBuilder {
    fn compose(&self, draft: &Draft, event: &Event) -> Result<Vec<u8>, PayloadError> {
        let document = compose_document(draft, event)?;
        Ok(serde_json::to_vec(&document)?)
    }
}

/// Builds the report document as a JSON value.
pub fn compose_document(draft: &Draft, event: &Event) -> Result<Value, PayloadError> {
    let mut data = draft.data().clone();

    for (key, value) in event.occurrence_data() {
        data.insert(key.clone(), value.clone());
    }

    data.insert("body".to_string(), Value::Object(event.body().clone()));
    data.insert(
        "level".to_string(),
        Value::String(event.level().as_str().to_string()),
    );
    data.insert("timestamp".to_string(), Value::from(event.timestamp()));

    if !event.custom().is_empty() {
        let mut custom = match data.remove("custom") {
            Some(Value::Object(existing)) => existing,
            Some(other) => {
                return Err(PayloadError::InvalidDraft(format!(
                    "custom must be an object, got {other}"
                )))
            }
            None => Map::new(),
        };
        for (key, value) in event.custom() {
            custom.insert(key.clone(), value.clone());
        }
        data.insert("custom".to_string(), Value::Object(custom));
    }

    let mut document = Map::new();
    document.insert(
        "access_token".to_string(),
        Value::String(draft.access_token().to_string()),
    );
    document.insert("data".to_string(), Value::Object(data));
    Ok(Value::Object(document))
}
