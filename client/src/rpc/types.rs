//! Wire shapes of the node responses the client decodes.

use alloy::primitives::{Address, B256, U256, U64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trace_flattener::tx::SignedTransaction;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHeader {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: U64,
    pub timestamp: U64,
    #[serde(default)]
    pub miner: Address,
    #[serde(default)]
    pub state_root: B256,
    #[serde(default)]
    pub transactions_root: B256,
    #[serde(default)]
    pub receipts_root: B256,
    #[serde(default)]
    pub difficulty: U256,
    #[serde(default)]
    pub gas_limit: U64,
    #[serde(default)]
    pub gas_used: U64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub uncles: Vec<B256>,
}

impl RpcHeader {
    pub fn number(&self) -> u64 {
        self.number.to::<u64>()
    }

    pub fn timestamp_millis(&self) -> i64 {
        (self.timestamp.to::<u64>() as i64).saturating_mul(1000)
    }
}

/// `eth_getBlockBy*` with full transaction bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBlock {
    #[serde(flatten)]
    pub header: RpcHeader,
    #[serde(default)]
    pub transactions: Vec<SignedTransaction>,
}

/// `eth_syncing` returns `false`, or the sync progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncingResult {
    NotSyncing(bool),
    Syncing(SyncProgress),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current_block: U64,
    pub highest_block: U64,
}

/// One entry of `admin_peers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enode: Option<String>,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub protocols: Value,
}

/// A quantity that nodes render either as a JSON number or as a hex (or
/// decimal) string, depending on the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Big(U256),
}

impl Quantity {
    pub fn to_u256(self) -> U256 {
        match self {
            Self::Number(it) => U256::from(it),
            Self::Big(it) => it,
        }
    }

    /// `None` if the quantity doesn't fit.
    pub fn to_u64(self) -> Option<u64> {
        match self {
            Self::Number(it) => Some(it),
            Self::Big(it) => u64::try_from(it).ok(),
        }
    }
}
