//! Message envelope passed from receivers through the bus.

use serde::{Deserialize, Serialize};

use crate::id::generate_message_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message ID
    pub id: String,
    /// Routing key used by the bus to pick a handler
    pub message_type: String,
    /// Message payload
    pub body: serde_json::Value,
    /// Name of the receiver the message was fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_from: Option<String>,
    /// Explicit bus to dispatch on, overriding type-based routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,
}

impl Envelope {
    pub fn new(message_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id: generate_message_id(),
            message_type: message_type.into(),
            body,
            received_from: None,
            bus_name: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn on_bus(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = Some(bus_name.into());
        self
    }

    pub fn received_from(mut self, receiver: impl Into<String>) -> Self {
        self.received_from = Some(receiver.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_envelope() {
        let envelope = Envelope::new("SmsNotification", json!({"to": "+15550100"}));
        assert!(envelope.id.starts_with("msg-"));
        assert_eq!(envelope.message_type, "SmsNotification");
        assert!(envelope.received_from.is_none());
        assert!(envelope.bus_name.is_none());
    }

    #[test]
    fn test_builders() {
        let envelope = Envelope::new("Ping", json!(null))
            .with_id("msg-1")
            .on_bus("command.bus")
            .received_from("async");
        assert_eq!(envelope.id, "msg-1");
        assert_eq!(envelope.bus_name.as_deref(), Some("command.bus"));
        assert_eq!(envelope.received_from.as_deref(), Some("async"));
    }

    #[test]
    fn test_optional_fields_are_omitted_when_serialized() {
        let envelope = Envelope::new("Ping", json!({})).with_id("msg-2");
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("received_from").is_none());
        assert!(value.get("bus_name").is_none());

        let restored: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(restored, envelope);
    }
}
