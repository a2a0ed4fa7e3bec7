//! Call tree + receipt -> ordered Rosetta operations.
//!
//! Operations are emitted in three phases:
//! 1. A `MINT` credit, for deposits that mint value on L2.
//! 2. One debit/credit pair per `CALL`, `CREATE`, `CREATE2` or `SELFDESTRUCT`
//!    frame, in pre-order over the call tree. Delegated and static frames
//!    never move value of their own. A frame's own transfer therefore precedes everything its
//!    sub-calls do, and sub-calls precede the frame's later siblings.
//! 3. Fee accounting: the L2 execution fee (with the base fee either routed
//!    to a vault or burned) and the rollup L1 data fee.
//!
//! Failed frames are still emitted, with status `FAILURE` and the error in
//! the operation metadata. A frame inherits the error of its nearest failed
//! ancestor, since everything beneath a revert is rolled back.

use std::collections::HashMap;

use alloy::primitives::{address, Address, U256};
use itertools::Itertools as _;
use serde_json::Value;

use crate::{
    fee,
    receipt::Receipt,
    rosetta::{
        Amount, Currency, Metadata, Operation, OperationIdentifier, OperationStatus,
        OperationType,
    },
    trace::CallTrace,
    tx::SignedTransaction,
    DecodeError,
};

/// OP stack predeploy collecting the base fee.
pub const BASE_FEE_VAULT: Address = address!("4200000000000000000000000000000000000019");
/// OP stack predeploy collecting the L1 data fee.
pub const L1_FEE_VAULT: Address = address!("420000000000000000000000000000000000001a");

/// Reported for the root frame of a reverted transaction whose trace carries
/// no error of its own.
const REVERTED: &str = "execution reverted";

/// Chain-wide constants, fixed at client construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    pub currency: Currency,
    /// Recipient of the base fee portion of the L2 fee. The base fee is
    /// recorded as burned when this is `None`.
    pub base_fee_vault: Option<Address>,
    pub l1_fee_vault: Address,
    /// Pre-Ecotone fixed gas overhead per transaction.
    pub l1_fee_overhead: u64,
    /// Pre-Ecotone fee scalar, six decimals. Used when a receipt doesn't carry
    /// one.
    pub l1_fee_scalar: u64,
    /// Whether calldata gas excludes the signature padding charged at
    /// Bedrock.
    pub regolith: bool,
    /// Fjord activation, in seconds since the epoch. `None` if it never
    /// activates.
    pub fjord_time: Option<u64>,
}

/// OP mainnet's Fjord activation.
pub const FJORD_TIME: u64 = 1_720_627_201;

impl ChainConfig {
    pub fn is_fjord_active(&self, timestamp: u64) -> bool {
        self.fjord_time.is_some_and(|it| timestamp >= it)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            base_fee_vault: Some(BASE_FEE_VAULT),
            l1_fee_vault: L1_FEE_VAULT,
            l1_fee_overhead: 2100,
            l1_fee_scalar: 1_000_000,
            regolith: true,
            fjord_time: Some(FJORD_TIME),
        }
    }
}

/// Per-block inputs to fee accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockContext {
    /// Receives the priority portion of the L2 fee.
    pub miner: Address,
    /// `None` before London.
    pub base_fee: Option<U256>,
    pub timestamp: u64,
}

/// Flattens one transaction.
///
/// `trace` must be the `callTracer` output for `tx`, and `receipt` its receipt.
/// The result is a pure function of the inputs.
pub fn flatten(
    tx: &SignedTransaction,
    receipt: &Receipt,
    trace: &CallTrace,
    block: &BlockContext,
    chain: &ChainConfig,
) -> Result<Vec<Operation>, DecodeError> {
    if receipt.transaction_hash != tx.hash() {
        return Err(DecodeError::ReceiptMismatch {
            transaction: tx.hash(),
            receipt: receipt.transaction_hash,
        });
    }

    let mut ops = Operations::new(&chain.currency);

    if let Some(mint) = tx.mint.filter(|it| !it.is_zero()) {
        ops.credit(OperationType::Mint, tx.sender(), mint, None);
    }

    flatten_calls(&mut ops, trace, receipt.succeeded());

    if !tx.is_deposit() {
        flatten_fees(&mut ops, tx, receipt, block, chain)?;
    }

    Ok(ops.into_inner())
}

fn flatten_calls(ops: &mut Operations, trace: &CallTrace, succeeded: bool) {
    let currency = ops.currency;
    // nodes are in pre-order, so every parent's error is known before its
    // children are visited
    let mut errors = Vec::<Option<&str>>::with_capacity(trace.len());

    for (index, node) in trace.nodes().iter().enumerate() {
        let own = match (&node.error, index) {
            (Some(error), _) => Some(error.as_str()),
            (None, 0) if !succeeded => Some(REVERTED),
            (None, _) => None,
        };
        let error = own.or_else(|| node.parent.and_then(|parent| errors[parent]));
        errors.push(error);

        let Some(kind) = node.kind.operation_type() else {
            continue;
        };
        if node.value.is_zero() && !node.kind.always_emitted() {
            continue;
        }

        let (status, metadata) = match error {
            Some(error) => (
                OperationStatus::Failure,
                Some(Metadata::from_iter([(
                    "error".to_string(),
                    Value::String(error.to_string()),
                )])),
            ),
            None => (OperationStatus::Success, None),
        };
        let debit = ops.push(
            kind,
            status,
            node.from,
            nonzero(node.value).map(|it| Amount::debit(it, currency)),
            None,
            metadata.clone(),
        );
        if let Some(to) = node.to {
            ops.push(
                kind,
                status,
                to,
                nonzero(node.value).map(|it| Amount::credit(it, currency)),
                Some(debit),
                metadata,
            );
        }
    }
}

fn flatten_fees(
    ops: &mut Operations,
    tx: &SignedTransaction,
    receipt: &Receipt,
    block: &BlockContext,
    chain: &ChainConfig,
) -> Result<(), DecodeError> {
    let gas_used = U256::from(receipt.gas_used.to::<u64>());
    let fee = gas_used.saturating_mul(fee::effective_gas_price(tx, receipt));
    let base = block
        .base_fee
        .map(|it| it.saturating_mul(gas_used).min(fee))
        .unwrap_or_default();
    let priority = fee - base;

    let (debited, burned) = match chain.base_fee_vault {
        Some(_) => (fee, U256::ZERO),
        None => (priority, base),
    };

    if !debited.is_zero() {
        let debit = ops.debit(OperationType::Fee, tx.sender(), debited);
        if !priority.is_zero() {
            ops.credit(OperationType::Fee, block.miner, priority, Some(debit));
        }
        if let Some(vault) = chain.base_fee_vault.filter(|_| !base.is_zero()) {
            ops.credit(OperationType::Fee, vault, base, Some(debit));
        }
    }
    if !burned.is_zero() {
        ops.debit(OperationType::Burn, tx.sender(), burned);
    }

    if let Some(l1_fee) = fee::l1_data_fee(tx, receipt, block, chain)?.and_then(nonzero) {
        let debit = ops.debit(OperationType::L1Fee, tx.sender(), l1_fee);
        ops.credit(OperationType::L1Fee, chain.l1_fee_vault, l1_fee, Some(debit));
    }

    Ok(())
}

/// Whether the `SUCCESS` operations in `ops` net to zero in every currency.
///
/// `MINT` and `BURN` are one-sided by construction and are left out, as are
/// failed operations. Unparseable amounts make the set non-conserving.
pub fn is_value_conserved(ops: &[Operation]) -> bool {
    let Some(amounts) = ops
        .iter()
        .filter(|op| op.status == OperationStatus::Success && !op.kind.is_asymmetric())
        .filter_map(|op| op.amount.as_ref())
        .map(|amount| Some((amount.currency.clone(), amount.signed()?)))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };

    let totals: HashMap<Currency, (U256, U256)> = amounts
        .into_iter()
        .into_grouping_map()
        .fold(
            (U256::ZERO, U256::ZERO),
            |(credits, debits), _currency, (negative, magnitude)| {
                if negative {
                    (credits, debits.saturating_add(magnitude))
                } else {
                    (credits.saturating_add(magnitude), debits)
                }
            },
        );
    totals
        .values()
        .all(|(credits, debits)| credits == debits)
}

fn nonzero(value: U256) -> Option<U256> {
    (!value.is_zero()).then_some(value)
}

/// The only mutable state during flattening.
struct Operations<'a> {
    currency: &'a Currency,
    ops: Vec<Operation>,
}

impl<'a> Operations<'a> {
    fn new(currency: &'a Currency) -> Self {
        Self {
            currency,
            ops: Vec::new(),
        }
    }

    fn push(
        &mut self,
        kind: OperationType,
        status: OperationStatus,
        account: Address,
        amount: Option<Amount>,
        related: Option<OperationIdentifier>,
        metadata: Option<Metadata>,
    ) -> OperationIdentifier {
        let id = OperationIdentifier {
            index: self.ops.len() as u64,
        };
        self.ops.push(Operation {
            operation_identifier: id,
            related_operations: related.map(|it| vec![it]),
            kind,
            status,
            account: Some(account.into()),
            amount,
            metadata,
        });
        id
    }

    fn debit(&mut self, kind: OperationType, account: Address, value: U256) -> OperationIdentifier {
        let amount = Amount::debit(value, self.currency);
        self.push(kind, OperationStatus::Success, account, Some(amount), None, None)
    }

    fn credit(
        &mut self,
        kind: OperationType,
        account: Address,
        value: U256,
        related: Option<OperationIdentifier>,
    ) -> OperationIdentifier {
        let amount = Amount::credit(value, self.currency);
        self.push(kind, OperationStatus::Success, account, Some(amount), related, None)
    }

    fn into_inner(self) -> Vec<Operation> {
        self.ops
    }
}
