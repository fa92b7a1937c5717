use crate::errors::RecordError;
use directory::types::{DeliveryEvent, EventType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One queued message as handed over by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub body: String,
}

impl IncomingMessage {
    pub fn new<I, B>(message_id: I, body: B) -> Self
    where
        I: Into<String>,
        B: Into<String>,
    {
        IncomingMessage {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

/// An ordered batch of messages. Deserializes from the queue event envelope
/// `{"Records": [{"messageId": ..., "body": ...}]}`; other envelope and record
/// fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Batch {
    #[serde(rename = "Records", alias = "records")]
    pub records: Vec<IncomingMessage>,
}

impl Batch {
    pub fn new(records: Vec<IncomingMessage>) -> Self {
        Batch { records }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeliveryEvent {
    recipient_id: Option<String>,
    vendor_id: Option<String>,
    recipient_email: Option<String>,
    recipient_name: Option<String>,
    vendor_name: Option<String>,
    attestation_url: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, RecordError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RecordError::Validation(format!(
            "missing required field `{field}`"
        ))),
    }
}

impl TryFrom<RawDeliveryEvent> for DeliveryEvent {
    type Error = RecordError;

    fn try_from(raw: RawDeliveryEvent) -> Result<Self, Self::Error> {
        let recipient_id = required(raw.recipient_id, "recipientId")?;
        let vendor_id = required(raw.vendor_id, "vendorId")?;
        let recipient_email = required(raw.recipient_email, "recipientEmail")?;
        let event_type = required(raw.event_type, "type")?;

        let event_type = EventType::parse(&event_type).ok_or_else(|| {
            RecordError::Validation(format!("unknown event type `{event_type}`"))
        })?;

        Ok(DeliveryEvent {
            recipient_id,
            vendor_id,
            recipient_email,
            recipient_name: raw.recipient_name,
            vendor_name: raw.vendor_name,
            attestation_url: raw.attestation_url,
            event_type,
        })
    }
}

/// Decodes a message body and checks it carries everything an endpoint upsert needs.
///
/// A body that is not a JSON object, or whose fields have the wrong JSON type, is a
/// parse error. A well-formed body with missing or blank required fields, or an
/// unknown event type, is a validation error.
pub fn parse_event(body: &str) -> Result<DeliveryEvent, RecordError> {
    // Derived struct deserialization also accepts arrays, matched by position.
    let object: Map<String, Value> =
        serde_json::from_str(body).map_err(|e| RecordError::Parse(e.to_string()))?;
    let raw: RawDeliveryEvent = serde_json::from_value(Value::Object(object))
        .map_err(|e| RecordError::Parse(e.to_string()))?;
    DeliveryEvent::try_from(raw)
}

#[cfg(test)]
pub(crate) fn event_body(recipient_id: &str, vendor_id: &str, event_type: &str) -> String {
    serde_json::json!({
        "recipientId": recipient_id,
        "vendorId": vendor_id,
        "recipientEmail": format!("{recipient_id}@example.com"),
        "recipientName": "Recipient Inc",
        "vendorName": "Vendor Co",
        "attestationUrl": "https://attest.example.com/a/1",
        "type": event_type,
    })
    .to_string()
}
