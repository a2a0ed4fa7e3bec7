//! Your rollup node speaks `callTracer` traces and receipts.
//!
//! But auditors, indexers and custodians want a flat, ordered list of
//! balance changes per transaction, which is the Rosetta data model in
//! [`rosetta`].
//!
//! This library gets you there, without doing any I/O:
//! - [`trace::CallFrame`] is alloy's nested `callTracer` payload, which is
//!   turned into a read-only [`trace::CallTrace`] arena.
//! - [`flatten()`] walks that arena alongside the [`receipt::Receipt`] and the
//!   [`tx::SignedTransaction`] body, and emits [`rosetta::Operation`]s.
//! - [`fee`] prices the L2 execution fee, and picks the rollup L1 data-fee
//!   formula for each hardfork.
//!
//! Every successful, non-issuance operation set produced here satisfies
//! [`is_value_conserved`].

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]

pub mod fee;
mod flatten;
pub mod receipt;
pub mod rosetta;
pub mod trace;
pub mod tx;

use alloy::primitives::B256;
pub use flatten::{
    flatten, is_value_conserved, BlockContext, ChainConfig, BASE_FEE_VAULT, FJORD_TIME,
    L1_FEE_VAULT,
};

/// Raw node data that can't be flattened.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("transaction {hash} can't be serialized: {reason}")]
    Envelope { hash: B256, reason: String },
    #[error("unknown call frame type {0:?}")]
    UnknownFrameKind(String),
    #[error("receipt for {receipt} was supplied for transaction {transaction}")]
    ReceiptMismatch { transaction: B256, receipt: B256 },
    #[error("invalid l1 fee scalar {0:?}")]
    InvalidFeeScalar(String),
}
