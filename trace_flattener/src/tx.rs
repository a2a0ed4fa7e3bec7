//! Transaction bodies as returned by `eth_getBlockByNumber(.., true)`, and
//! their canonical EIP-2718 serialization, which sizes the L1 data fee.

use alloy::{
    consensus::TxEnvelope,
    eips::eip2718::Encodable2718 as _,
    primitives::{Address, B256, U256},
    rpc::types::eth::Transaction,
};
use serde::{Deserialize, Serialize};

use crate::DecodeError;

/// L1-to-L2 deposits. These pay no L2 or L1 fees.
pub const DEPOSIT_TX_TYPE: u8 = 0x7e;

/// An ethereum transaction, plus the fields a rollup adds for deposits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub inner: Transaction,
    /// Value minted on L2 by a deposit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<B256>,
}

impl SignedTransaction {
    pub fn hash(&self) -> B256 {
        self.inner.hash
    }

    pub fn sender(&self) -> Address {
        self.inner.from
    }

    pub fn tx_type(&self) -> u8 {
        self.inner.transaction_type.unwrap_or_default()
    }

    pub fn is_deposit(&self) -> bool {
        self.tx_type() == DEPOSIT_TX_TYPE
    }

    pub fn gas(&self) -> U256 {
        U256::from(self.inner.gas)
    }

    pub fn gas_price(&self) -> Option<U256> {
        self.inner.gas_price.map(U256::from)
    }

    /// The network encoding of a signed transaction: a bare RLP list for
    /// legacy transactions, `type || rlp(..)` for typed ones.
    ///
    /// Deposits have no ethereum envelope and are rejected.
    pub fn encode_2718(&self) -> Result<Vec<u8>, DecodeError> {
        let envelope =
            TxEnvelope::try_from(self.inner.clone()).map_err(|e| DecodeError::Envelope {
                hash: self.hash(),
                reason: e.to_string(),
            })?;
        Ok(envelope.encoded_2718())
    }
}
