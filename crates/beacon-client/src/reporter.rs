//! Report front end
//!
//! Convenience entry points that turn messages and panics into
//! [`Event`]s and hand them to a [`Client`].

use beacon_core::domain::{Event, Level};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::dispatcher::{emit, Client};

/// Reports a plain-text message.
///
/// A missing client makes this a logged no-op.
pub fn report_message(
    client: Option<&Client>,
    level: Level,
    message: &str,
    custom: Map<String, Value>,
    occurrence_data: Map<String, Value>,
) {
    let event = Event::message(level, message)
        .with_custom(custom)
        .with_occurrence_data(occurrence_data);
    emit(client, event);
}

/// Source position of a panic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Builds the `critical` report for a panic.
///
/// The body is a single-frame trace with exception class `panic`; the
/// occurrence carries a fresh `uuid`.
pub fn panic_event(message: &str, location: Option<&PanicLocation>) -> Event {
    let frames: Vec<Value> = location
        .map(|l| {
            vec![json!({
                "filename": l.file,
                "lineno": l.line,
                "colno": l.column,
            })]
        })
        .unwrap_or_default();

    let mut body = Map::new();
    body.insert(
        "trace".to_string(),
        json!({
            "frames": frames,
            "exception": {
                "class": "panic",
                "message": message,
            },
        }),
    );

    let mut occurrence_data = Map::new();
    occurrence_data.insert("uuid".to_string(), json!(Uuid::new_v4().to_string()));

    Event::message(Level::Critical, message)
        .with_body(body)
        .with_occurrence_data(occurrence_data)
}

/// Installs a panic hook that reports panics through `client`.
///
/// Chains with the existing panic hook so default behavior (stderr output)
/// is preserved.
pub fn install_panic_reporter(client: Client) {
    let previous_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        let location = panic_info.location().map(|l| PanicLocation {
            file: l.file().to_string(),
            line: l.line(),
            column: l.column(),
        });

        client.emit(panic_event(&message, location.as_ref()));

        previous_hook(panic_info);
    }));
}
