//! Engine notifications.

use serde::Deserialize;
use serde_json::Value;

use crate::constants::{NotificationType, ProtocolConstants};
use crate::errors::Result;

#[derive(Deserialize)]
struct NotificationContract {
    data: NotificationData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationData {
    notification_type: Value,
    #[serde(default)]
    data: Value,
}

/// A pushed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Decoded type; `None` for types this runtime does not know
    pub notification_type: Option<NotificationType>,
    /// Type exactly as sent
    pub raw_type: Value,
    /// Payload
    pub data: Value,
}

impl Notification {
    /// Decode a notification message body
    pub fn from_body(body: &Value, constants: &ProtocolConstants) -> Result<Self> {
        let contract = NotificationContract::deserialize(body)?;
        Ok(Self {
            notification_type: constants.decode(&contract.data.notification_type),
            raw_type: contract.data.notification_type,
            data: contract.data.data,
        })
    }
}
