use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type ApplicationId = String;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
}

impl Application {
    pub fn new<I, N>(id: I, name: N) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Application {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::Created, EventType::Updated, EventType::Deleted];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
        }
    }

    /// Exact, case-sensitive match against the wire names.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated delivery event for one recipient in one vendor context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub recipient_id: String,
    pub vendor_id: String,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub vendor_name: Option<String>,
    pub attestation_url: Option<String>,
    pub event_type: EventType,
}

impl DeliveryEvent {
    /// Deterministic key of the endpoint this event targets. Repeated deliveries for
    /// the same recipient/vendor pair always resolve to the same endpoint.
    pub fn endpoint_key(&self) -> String {
        format!("{}-{}", self.recipient_id, self.vendor_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    Email,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptOut {
    All,
    None,
}

pub type Attributes = BTreeMap<String, Vec<String>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointUser {
    pub user_id: String,
    pub user_attributes: Attributes,
}

/// Full state of one endpoint record as written to the directory. Every upsert
/// replaces the stored record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointRequest {
    pub address: String,
    pub channel_type: ChannelType,
    pub attributes: Attributes,
    pub user: EndpointUser,
    pub opt_out: OptOut,
}

fn insert_present(attributes: &mut Attributes, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), vec![value.clone()]);
    }
}

impl From<&DeliveryEvent> for EndpointRequest {
    fn from(event: &DeliveryEvent) -> Self {
        let mut attributes = Attributes::new();
        insert_present(&mut attributes, "recipientName", event.recipient_name.as_ref());
        insert_present(&mut attributes, "vendorName", event.vendor_name.as_ref());
        insert_present(&mut attributes, "vendorId", Some(&event.vendor_id));
        insert_present(&mut attributes, "attestationUrl", event.attestation_url.as_ref());

        let mut user_attributes = Attributes::new();
        insert_present(&mut user_attributes, "recipientName", event.recipient_name.as_ref());
        insert_present(&mut user_attributes, "vendorName", event.vendor_name.as_ref());

        let opt_out = match event.event_type {
            EventType::Deleted => OptOut::All,
            EventType::Created | EventType::Updated => OptOut::None,
        };

        EndpointRequest {
            address: event.recipient_email.clone(),
            channel_type: ChannelType::Email,
            attributes,
            user: EndpointUser {
                user_id: event.recipient_id.clone(),
                user_attributes,
            },
            opt_out,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_event(recipient_id: &str, vendor_id: &str, event_type: EventType) -> DeliveryEvent {
    DeliveryEvent {
        recipient_id: recipient_id.into(),
        vendor_id: vendor_id.into(),
        recipient_email: format!("{recipient_id}@example.com"),
        recipient_name: Some("Recipient Inc".into()),
        vendor_name: Some("Vendor Co".into()),
        attestation_url: Some("https://attest.example.com/a/1".into()),
        event_type,
    }
}
