//! Wire types for the Servoscope event transport.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name used to start receiving a channel.
pub const SUBSCRIBE_EVENT: &str = "subscribe";

/// Event name used to stop receiving a channel.
pub const UNSUBSCRIBE_EVENT: &str = "unsubscribe";

/// One event travelling over the transport.
///
/// On the wire an envelope is a single textual frame holding a two-element
/// JSON array: `["event-name", payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Value)", into = "(String, Value)")]
pub struct Envelope {
    /// Channel / event name
    pub event: String,

    /// Arbitrary JSON payload
    pub payload: Value,
}

impl Envelope {
    /// Creates an envelope from an event name and payload.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Builds the `["subscribe", channel]` request.
    pub fn subscribe(channel: &str) -> Self {
        Self::new(SUBSCRIBE_EVENT, Value::String(channel.to_string()))
    }

    /// Serializes any payload into an envelope.
    pub fn from_payload<P: Serialize>(event: impl Into<String>, payload: &P) -> Result<Self, EnvError> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }

    /// Encodes the envelope into one text frame.
    pub fn encode(&self) -> Result<String, EnvError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes one text frame.
    pub fn decode(frame: &str) -> Result<Self, EnvError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Returns the channel named by a subscribe/unsubscribe request.
    pub fn channel_arg(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

impl From<(String, Value)> for Envelope {
    fn from((event, payload): (String, Value)) -> Self {
        Self { event, payload }
    }
}

impl From<Envelope> for (String, Value) {
    fn from(envelope: Envelope) -> Self {
        (envelope.event, envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new("servo-position", json!({"n": 1, "position": 0.5, "time": 3.0}));
        let frame = envelope.encode().unwrap();

        assert!(frame.starts_with("[\"servo-position\","));
        assert_eq!(Envelope::decode(&frame).unwrap(), envelope);
    }

    #[test]
    fn test_subscribe_request() {
        let envelope = Envelope::subscribe("gyro-0-measure");
        assert_eq!(envelope.encode().unwrap(), r#"["subscribe","gyro-0-measure"]"#);
        assert_eq!(envelope.channel_arg(), Some("gyro-0-measure"));
    }

    #[test]
    fn test_decode_rejects_non_pairs() {
        assert!(matches!(
            Envelope::decode(r#"{"event": "time"}"#),
            Err(EnvError::SerializationError(_))
        ));
        assert!(Envelope::decode(r#"["time"]"#).is_err());
        assert!(Envelope::decode("not json").is_err());
    }
}
