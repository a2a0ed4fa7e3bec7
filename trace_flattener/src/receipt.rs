use alloy::primitives::{Address, B256, U256, U64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of a rollup transaction receipt the flattener consumes.
///
/// Logs and the bloom filter are carried opaquely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    /// Absent on pre-Byzantium receipts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<U64>,
    pub gas_used: U64,
    #[serde(default)]
    pub cumulative_gas_used: U64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_bloom: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_gas_used: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_fee: Option<U256>,
    /// Decimal string, e.g. `"0.684"`. Bedrock only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_fee_scalar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_base_fee_scalar: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_blob_base_fee: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_blob_base_fee_scalar: Option<U64>,
}

impl Receipt {
    /// Pre-Byzantium receipts carry no status and are treated as successful.
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |it| !it.is_zero())
    }

    /// `(baseFeeScalar, blobBaseFee, blobBaseFeeScalar)`, reported from
    /// Ecotone on.
    pub fn ecotone_scalars(&self) -> Option<(U256, U256, U256)> {
        Some((
            U256::from(self.l1_base_fee_scalar?.to::<u64>()),
            self.l1_blob_base_fee?,
            U256::from(self.l1_blob_base_fee_scalar?.to::<u64>()),
        ))
    }
}
