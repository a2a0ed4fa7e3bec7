//! L2 execution fee, and selection of the rollup L1 data-fee formula.
//!
//! The formulas themselves live in [`op_alloy_protocol`]; this module decides
//! which hardfork's formula prices a transaction, and reconciles the result
//! with what the node reported.

use alloy::primitives::U256;
use log::debug;
use op_alloy_protocol::{
    calculate_tx_l1_cost_bedrock, calculate_tx_l1_cost_ecotone, calculate_tx_l1_cost_fjord,
    calculate_tx_l1_cost_regolith,
};

use crate::{
    flatten::{BlockContext, ChainConfig},
    receipt::Receipt,
    tx::SignedTransaction,
    DecodeError,
};

/// Fee scalars are fixed point with six decimals.
pub const FEE_SCALAR_DECIMALS: u32 = 6;
const FEE_SCALAR_DENOMINATOR: u64 = 1_000_000;

/// Parses a decimal fee scalar such as `"0.684"` into its fixed point
/// representation (`684000`).
///
/// Digits beyond the sixth decimal are truncated.
pub fn parse_fee_scalar(scalar: &str) -> Result<U256, DecodeError> {
    let invalid = || DecodeError::InvalidFeeScalar(scalar.to_string());
    let (whole, fraction) = scalar.trim().split_once('.').unwrap_or((scalar.trim(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole = match whole {
        "" => U256::ZERO,
        it => U256::from_str_radix(it, 10).map_err(|_| invalid())?,
    };
    let mut fraction = fraction
        .chars()
        .take(FEE_SCALAR_DECIMALS as usize)
        .collect::<String>();
    while fraction.len() < FEE_SCALAR_DECIMALS as usize {
        fraction.push('0');
    }
    let fraction = U256::from_str_radix(&fraction, 10).map_err(|_| invalid())?;

    Ok(whole
        .saturating_mul(U256::from(FEE_SCALAR_DENOMINATOR))
        .saturating_add(fraction))
}

/// The price per unit of L2 gas actually paid by `tx`.
pub fn effective_gas_price(tx: &SignedTransaction, receipt: &Receipt) -> U256 {
    receipt
        .effective_gas_price
        .or_else(|| tx.gas_price())
        .unwrap_or_default()
}

/// The rollup data-availability fee charged to `tx`, or `None` for
/// transactions that do not pay one (deposits, or chains whose receipts carry
/// no L1 pricing).
///
/// When the receipt reports the fee the node charged, that value is
/// authoritative; the fee computed from the serialized transaction is only
/// used when the receipt omits it.
pub fn l1_data_fee(
    tx: &SignedTransaction,
    receipt: &Receipt,
    block: &BlockContext,
    chain: &ChainConfig,
) -> Result<Option<U256>, DecodeError> {
    if tx.is_deposit() {
        return Ok(None);
    }
    let Some(l1_base_fee) = receipt.l1_gas_price else {
        return Ok(receipt.l1_fee);
    };

    let computed = match (tx.encode_2718(), receipt.l1_fee) {
        (Ok(raw), _) => Some(compute_l1_fee(&raw, l1_base_fee, receipt, block, chain)?),
        (Err(e), Some(_)) => {
            debug!("not recomputing l1 fee: {e}");
            None
        }
        (Err(e), None) => return Err(e),
    };

    Ok(match (receipt.l1_fee, computed) {
        (Some(reported), Some(computed)) => {
            if reported != computed {
                debug!(
                    "l1 fee for {} reported as {reported}, computed {computed}",
                    tx.hash()
                );
            }
            Some(reported)
        }
        (reported, computed) => reported.or(computed),
    })
}

/// Prices `raw` with the formula of the hardfork `block` falls in.
///
/// Receipts only carry the blob fee scalars from Ecotone on. Fjord receipts
/// look the same, so Fjord is told apart by its activation time.
fn compute_l1_fee(
    raw: &[u8],
    l1_base_fee: U256,
    receipt: &Receipt,
    block: &BlockContext,
    chain: &ChainConfig,
) -> Result<U256, DecodeError> {
    if let Some((base_fee_scalar, blob_base_fee, blob_base_fee_scalar)) =
        receipt.ecotone_scalars()
    {
        let cost = if chain.is_fjord_active(block.timestamp) {
            calculate_tx_l1_cost_fjord
        } else {
            calculate_tx_l1_cost_ecotone
        };
        return Ok(cost(
            raw,
            l1_base_fee,
            base_fee_scalar,
            blob_base_fee,
            blob_base_fee_scalar,
        ));
    }

    let scalar = match &receipt.l1_fee_scalar {
        Some(scalar) => parse_fee_scalar(scalar)?,
        None => U256::from(chain.l1_fee_scalar),
    };
    let cost = if chain.regolith {
        calculate_tx_l1_cost_regolith
    } else {
        calculate_tx_l1_cost_bedrock
    };
    Ok(cost(
        raw,
        U256::from(chain.l1_fee_overhead),
        l1_base_fee,
        scalar,
    ))
}
