//! Newline-delimited JSON framing for monitor notifications.
//!
//! Each message is one compact JSON object terminated by `\n`:
//!
//! ```text
//! {"event":"TASK_CREATED","task_id":"...","timestamp":"2025-01-01T12:00:00.000000Z"}
//! ```
//!
//! `event`, `task_id` and `timestamp` are required, non-null strings.
//! Unknown fields are kept so newer senders do not break older monitors.

use super::IpcEvent;
use crate::error::ErrorKind;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while decoding or encoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line is empty after trimming.
    #[error("empty message line")]
    EmptyMessage,

    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The JSON value is not an object.
    #[error("message must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A required field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A required field is `null`.
    #[error("{0} field cannot be null")]
    NullField(&'static str),

    /// A field that must be a string has another type.
    #[error("{field} must be a string, got {found}")]
    NotAString {
        /// Offending field.
        field: &'static str,
        /// JSON type that was found.
        found: &'static str,
    },

    /// `task_id` is the empty string.
    #[error("task_id field cannot be empty")]
    EmptyTaskId,

    /// `event` is not one of the known names.
    #[error("invalid event name: {0}")]
    UnknownEvent(String),

    /// The message could not be encoded.
    #[error("cannot encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Protocol
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcMessage {
    event: IpcEvent,
    task_id: String,
    timestamp: String,
    extra: Map<String, Value>,
}

impl IpcMessage {
    /// Returns the event.
    #[must_use]
    pub const fn event(&self) -> IpcEvent {
        self.event
    }

    /// Returns the task identifier as sent.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns the sender's timestamp as sent.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Returns fields beyond the required three.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    event: IpcEvent,
    task_id: &'a str,
    timestamp: &'a str,
}

/// Encodes one message as a single `\n`-terminated line.
///
/// When `timestamp` is `None` the current UTC time is used, with a `Z`
/// suffix.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if JSON encoding fails.
pub fn serialize_message(
    event: IpcEvent,
    task_id: &str,
    timestamp: Option<&str>,
) -> Result<String, ProtocolError> {
    let now = || Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let resolved = timestamp.map_or_else(now, str::to_owned);
    let mut line = serde_json::to_string(&WireMessage {
        event,
        task_id,
        timestamp: &resolved,
    })
    .map_err(ProtocolError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line, tolerating surrounding whitespace and CRLF endings.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing the first problem found.
pub fn deserialize_message(line: &str) -> Result<IpcMessage, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(ProtocolError::InvalidJson)?;
    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::NotAnObject(json_type(&value)));
    };

    // Presence is checked for all fields before any value is inspected.
    for field in ["event", "task_id", "timestamp"] {
        if !fields.contains_key(field) {
            return Err(ProtocolError::MissingField(field));
        }
    }

    let event = match fields.remove("event") {
        None => return Err(ProtocolError::MissingField("event")),
        Some(Value::Null) => return Err(ProtocolError::NullField("event")),
        Some(Value::String(name)) => IpcEvent::try_from(name.as_str())?,
        Some(other) => return Err(ProtocolError::UnknownEvent(other.to_string())),
    };
    let task_id = take_string(&mut fields, "task_id")?;
    if task_id.is_empty() {
        return Err(ProtocolError::EmptyTaskId);
    }
    let timestamp = take_string(&mut fields, "timestamp")?;

    Ok(IpcMessage {
        event,
        task_id,
        timestamp,
        extra: fields,
    })
}

fn take_string(
    fields: &mut Map<String, Value>,
    field: &'static str,
) -> Result<String, ProtocolError> {
    match fields.remove(field) {
        None => Err(ProtocolError::MissingField(field)),
        Some(Value::Null) => Err(ProtocolError::NullField(field)),
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ProtocolError::NotAString {
            field,
            found: json_type(&other),
        }),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
