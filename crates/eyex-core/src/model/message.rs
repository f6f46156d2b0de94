//! Message envelope: `{header: {messageType, metadata?}, body}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{MessageType, ProtocolConstants};
use crate::errors::Result;

/// Request correlation data carried in the header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Encoded request type (requests only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<Value>,
    /// Request id, echoed by the matching response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

/// Header as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderContract {
    /// Encoded message type
    pub message_type: Value,
    /// Optional request metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Envelope as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContract {
    /// Header
    pub header: HeaderContract,
    /// Body, shape depends on the message type
    #[serde(default)]
    pub body: Value,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message type
    pub message_type: MessageType,
    /// Request metadata, if any
    pub metadata: Option<Metadata>,
    /// Body
    pub body: Value,
}

impl Message {
    /// Create a message without metadata
    pub fn new(message_type: MessageType, body: Value) -> Self {
        Self {
            message_type,
            metadata: None,
            body,
        }
    }

    /// Create a request carrying an already encoded request type
    pub fn request(request_type: Value, request_id: u64, body: Value) -> Self {
        Self {
            message_type: MessageType::Request,
            metadata: Some(Metadata {
                request_type: Some(request_type),
                request_id: Some(request_id),
            }),
            body,
        }
    }

    /// Request id from the metadata
    pub fn request_id(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.request_id)
    }

    /// Encode for the wire
    pub fn to_contract(&self, constants: &ProtocolConstants) -> MessageContract {
        MessageContract {
            header: HeaderContract {
                message_type: constants.encode(self.message_type),
                metadata: self.metadata.clone(),
            },
            body: self.body.clone(),
        }
    }

    /// Decode a wire envelope
    pub fn from_contract(contract: MessageContract, constants: &ProtocolConstants) -> Result<Self> {
        Ok(Self {
            message_type: constants.decode_required(&contract.header.message_type)?,
            metadata: contract.header.metadata,
            body: contract.body,
        })
    }

    /// Decode a raw JSON frame
    pub fn from_value(value: Value, constants: &ProtocolConstants) -> Result<Self> {
        let contract: MessageContract = serde_json::from_value(value)?;
        Self::from_contract(contract, constants)
    }

    /// Encode to a raw JSON frame
    pub fn to_value(&self, constants: &ProtocolConstants) -> Result<Value> {
        Ok(serde_json::to_value(self.to_contract(constants))?)
    }
}
