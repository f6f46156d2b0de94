//! Interaction masks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{EyeXError, Result};

/// Mask on the wire, with base64 cell data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskContract {
    /// Number of columns
    pub column_count: u32,
    /// Number of rows
    pub row_count: u32,
    /// Base64 encoded row-major cells
    pub data: String,
}

/// Row-major byte matrix restricting an interactor's rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    row_count: u32,
    column_count: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Create a mask; `data` must hold exactly `row_count * column_count` cells
    pub fn new(row_count: u32, column_count: u32, data: Vec<u8>) -> Result<Self> {
        let expected = row_count as usize * column_count as usize;
        if data.len() != expected {
            return Err(EyeXError::invalid(format!(
                "mask of {row_count}x{column_count} needs {expected} cells, got {}",
                data.len()
            )));
        }
        Ok(Self {
            row_count,
            column_count,
            data,
        })
    }

    /// Number of rows
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Number of columns
    pub fn column_count(&self) -> u32 {
        self.column_count
    }

    /// Cells
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encode for the wire
    pub fn to_contract(&self) -> MaskContract {
        MaskContract {
            column_count: self.column_count,
            row_count: self.row_count,
            data: STANDARD.encode(&self.data),
        }
    }

    /// Decode a wire value
    pub fn from_contract(contract: &MaskContract) -> Result<Self> {
        Self::new(
            contract.row_count,
            contract.column_count,
            STANDARD.decode(&contract.data)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn base64_round_trip_is_byte_exact() {
        let cells: Vec<u8> = (0..=255).collect();
        let mask = Mask::new(16, 16, cells).unwrap();
        let contract = mask.to_contract();
        assert_eq!(Mask::from_contract(&contract).unwrap(), mask);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        assert_matches!(Mask::new(2, 2, vec![1, 0, 1]), Err(EyeXError::Invalid { .. }));
    }

    #[test]
    fn bad_base64_is_a_serialization_error() {
        let contract = MaskContract {
            column_count: 1,
            row_count: 1,
            data: "@@".to_string(),
        };
        assert_matches!(
            Mask::from_contract(&contract),
            Err(EyeXError::Serialization { .. })
        );
    }
}
