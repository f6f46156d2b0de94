//! Commands sent to the engine as `command` requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CommandType, ProtocolConstants};

/// Command body on the wire: `{commandType, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandContract {
    /// Encoded command type
    pub command_type: Value,
    /// Command argument
    #[serde(default)]
    pub data: Value,
}

/// A command awaiting execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command type
    pub command_type: CommandType,
    /// Command argument
    pub data: Value,
}

impl Command {
    /// Create a command
    pub fn new(command_type: CommandType, data: Value) -> Self {
        Self { command_type, data }
    }

    /// Encode for the wire
    pub fn to_contract(&self, constants: &ProtocolConstants) -> CommandContract {
        CommandContract {
            command_type: constants.encode(self.command_type),
            data: self.data.clone(),
        }
    }
}
