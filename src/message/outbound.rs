//! Outbound messages and the metadata attached to every send.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use super::envelope::MESSAGE_TYPE_ATTRIBUTE;
use super::types::{type_name_of, Message};

pub const QUEUE_VERSION_ATTRIBUTE: &str = "QueueVersion";
pub const SENDER_IP_ATTRIBUTE: &str = "SenderIpAddress";
pub const SENDER_VERSION_ATTRIBUTE: &str = "SenderVersion";

/// A serialized payload and its type name, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_type: &'static str,
    pub body: String,
}

impl OutboundMessage {
    pub fn encode<M: Message>(message: &M) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_type: type_name_of::<M>(),
            body: serde_json::to_string(message)?,
        })
    }

    /// Wire attributes: `messageType` followed by `common`.
    pub fn attributes(&self, common: &CommonMetadata) -> Vec<(String, String)> {
        let mut attributes = Vec::with_capacity(common.entries.len() + 1);
        attributes.push((MESSAGE_TYPE_ATTRIBUTE.to_string(), self.message_type.to_string()));
        attributes.extend(common.entries.iter().cloned());
        attributes
    }

    pub fn decode<M: Message>(&self) -> Result<M, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Metadata attached to every outbound message: bus protocol version,
/// sender address and (when known) sender application version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonMetadata {
    entries: Vec<(String, String)>,
}

impl CommonMetadata {
    /// Detect the sender address and build the metadata set.
    pub fn detect(application_version: Option<&str>) -> Self {
        Self::with_address(local_ip_address(), application_version)
    }

    pub fn with_address(address: IpAddr, application_version: Option<&str>) -> Self {
        let mut entries = vec![
            (
                QUEUE_VERSION_ATTRIBUTE.to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
            (SENDER_IP_ATTRIBUTE.to_string(), address.to_string()),
        ];
        if let Some(version) = application_version {
            entries.push((SENDER_VERSION_ATTRIBUTE.to_string(), version.to_string()));
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// First IPv4 address the host would route outbound traffic from.
///
/// Connecting a UDP socket sends nothing; it only selects a local address.
fn local_ip_address() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
