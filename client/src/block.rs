//! Block assembly.
//!
//! A block is fetched with its transaction bodies in one call, then every
//! transaction's receipt (one batched call) and call trace (admission-gated by
//! the [`TraceLimiter`](crate::limiter::TraceLimiter)) are fetched
//! concurrently and handed to [`trace_flattener::flatten`]. Any receipt or
//! trace that can't be resolved fails the whole block.

use std::collections::HashMap;

use alloy::{
    primitives::{B256, U256},
    rpc::types::trace::geth::{
        GethDebugBuiltInTracerType, GethDebugTracerType, GethDebugTracingOptions,
    },
};
use futures::{stream::FuturesOrdered, TryStreamExt as _};
use serde_json::{json, Map, Value};
use tracing::debug;
use trace_flattener::{
    fee,
    receipt::Receipt,
    rosetta::{
        Block, BlockIdentifier, Metadata, PartialBlockIdentifier, Transaction,
        TransactionIdentifier,
    },
    trace::{CallFrame, CallTrace},
    tx::SignedTransaction,
    BlockContext,
};

use crate::{
    error::decode,
    rpc::{
        types::{RpcBlock, RpcHeader},
        BatchElem, GraphQl, JsonRpc,
    },
    Client, Error, RequestContext, Result,
};

const UNCLE: &str = "eth_getUncleByBlockHashAndIndex";
const RECEIPT: &str = "eth_getTransactionReceipt";
const TRACE: &str = "debug_traceTransaction";

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    /// The fully flattened block at `block`, or the latest block.
    ///
    /// When both a hash and an index are given the block is fetched by hash,
    /// and an index that disagrees with it is an [`Error::InvalidBlock`].
    #[tracing::instrument(skip_all, fields(block = %describe_block(block)))]
    pub async fn block(
        &self,
        ctx: &RequestContext,
        block: Option<&PartialBlockIdentifier>,
    ) -> Result<Block> {
        ctx.run(self.assemble(ctx, block)).await
    }

    async fn assemble(
        &self,
        ctx: &RequestContext,
        requested: Option<&PartialBlockIdentifier>,
    ) -> Result<Block> {
        let RpcBlock {
            header,
            transactions,
        } = self.fetch_block(requested).await?;
        let id = header.hash.to_string();
        debug!(number = header.number(), txs = transactions.len(), "fetched block");

        let uncles = self.uncles(&header).await?;

        // genesis is neither traced nor preceded
        let (parent_block_identifier, transactions) = match header.number() {
            0 => (
                BlockIdentifier {
                    index: 0,
                    hash: id.clone(),
                },
                vec![],
            ),
            number => {
                let (receipts, traces) = futures::try_join!(
                    self.receipts(&id, &transactions),
                    self.traces(ctx, &id, &transactions)
                )?;
                let context = BlockContext {
                    miner: header.miner,
                    base_fee: header.base_fee_per_gas,
                    timestamp: header.timestamp.to::<u64>(),
                };
                let transactions = itertools::izip!(&transactions, receipts, traces)
                    .map(|(tx, receipt, trace)| self.transaction(tx, receipt, trace, &context))
                    .collect::<Result<Vec<_>>>()?;
                (
                    BlockIdentifier {
                        index: number - 1,
                        hash: header.parent_hash.to_string(),
                    },
                    transactions,
                )
            }
        };

        let block = Block {
            block_identifier: BlockIdentifier {
                index: header.number(),
                hash: id,
            },
            parent_block_identifier,
            timestamp: header.timestamp_millis(),
            transactions,
            metadata: Some(block_metadata(&header, &uncles)),
        };
        jsonify(block)
    }

    async fn fetch_block(&self, requested: Option<&PartialBlockIdentifier>) -> Result<RpcBlock> {
        let (method, params) = match requested {
            Some(PartialBlockIdentifier {
                hash: Some(hash), ..
            }) => ("eth_getBlockByHash", json!([parse_block_hash(hash)?, true])),
            Some(PartialBlockIdentifier {
                index: Some(index), ..
            }) => ("eth_getBlockByNumber", json!([format!("{index:#x}"), true])),
            _ => ("eth_getBlockByNumber", json!(["latest", true])),
        };
        let raw = self.call_raw(method, params).await?;
        if raw.is_null() {
            return Err(Error::NotFound);
        }
        let block: RpcBlock = decode(format!("block {}", describe_block(requested)), raw)?;

        if let Some(index) = requested.and_then(|it| it.index) {
            if index != block.header.number() {
                return Err(Error::InvalidBlock {
                    block: describe_block(requested),
                    reason: format!("hash resolves to block {}", block.header.number()),
                });
            }
        }
        Ok(block)
    }

    /// Matched back to `header.uncles` by position.
    async fn uncles(&self, header: &RpcHeader) -> Result<Vec<RpcHeader>> {
        let batch = (0..header.uncles.len())
            .map(|index| BatchElem::new(UNCLE, json!([header.hash, format!("{index:#x}")])))
            .collect();
        let results = self.batch_call(batch).await?;
        header
            .uncles
            .iter()
            .zip(results)
            .map(|(hash, res)| {
                let raw = res.map_err(|e| Error::transport(UNCLE, e))?;
                if raw.is_null() {
                    return Err(Error::incomplete(header.hash, format!("missing uncle {hash}")));
                }
                decode(format!("uncle {hash}"), raw)
            })
            .collect()
    }

    /// One receipt per transaction, in transaction order.
    async fn receipts(
        &self,
        block: &str,
        txs: &[SignedTransaction],
    ) -> Result<Vec<(Receipt, Value)>> {
        let batch = txs
            .iter()
            .map(|tx| BatchElem::new(RECEIPT, json!([tx.hash()])))
            .collect();
        let results = self.batch_call(batch).await?;

        let mut by_hash = HashMap::with_capacity(txs.len());
        for (tx, res) in txs.iter().zip(results) {
            let raw = res.map_err(|e| Error::transport(RECEIPT, e))?;
            if raw.is_null() {
                continue;
            }
            let receipt: Receipt = decode(format!("receipt of {}", tx.hash()), raw.clone())?;
            by_hash.insert(receipt.transaction_hash, (receipt, raw));
        }

        txs.iter()
            .map(|tx| {
                by_hash.remove(&tx.hash()).ok_or_else(|| {
                    Error::incomplete(block, format!("missing receipt of {}", tx.hash()))
                })
            })
            .collect()
    }

    /// One trace per transaction, in transaction order regardless of the
    /// order the fetches complete in.
    async fn traces(
        &self,
        ctx: &RequestContext,
        block: &str,
        txs: &[SignedTransaction],
    ) -> Result<Vec<(CallTrace, Value)>> {
        let raw = if self.batch_traces {
            self.batched_traces(ctx, txs).await?
        } else {
            self.unary_traces(ctx, txs).await?
        };
        txs.iter()
            .zip(raw)
            .map(|(tx, raw)| {
                if raw.is_null() {
                    return Err(Error::incomplete(
                        block,
                        format!("missing trace of {}", tx.hash()),
                    ));
                }
                let frame: CallFrame = decode(format!("trace of {}", tx.hash()), raw.clone())?;
                Ok((CallTrace::try_from(frame)?, raw))
            })
            .collect()
    }

    async fn unary_traces(
        &self,
        ctx: &RequestContext,
        txs: &[SignedTransaction],
    ) -> Result<Vec<Value>> {
        txs.iter()
            .map(|tx| async move {
                let _guard = self.limiter.acquire(ctx, 1).await?;
                self.call_raw(TRACE, self.trace_params(tx.hash())).await
            })
            .collect::<FuturesOrdered<_>>()
            .try_collect()
            .await
    }

    /// Batches are sized to the limiter's capacity, and each holds one unit
    /// per element while in flight.
    async fn batched_traces(
        &self,
        ctx: &RequestContext,
        txs: &[SignedTransaction],
    ) -> Result<Vec<Value>> {
        let chunks: Vec<Vec<Value>> = txs
            .chunks(self.limiter.capacity())
            .map(|chunk| async move {
                let _guard = self.limiter.acquire(ctx, chunk.len()).await?;
                let batch = chunk
                    .iter()
                    .map(|tx| BatchElem::new(TRACE, self.trace_params(tx.hash())))
                    .collect();
                self.batch_call(batch)
                    .await?
                    .into_iter()
                    .map(|res| res.map_err(|e| Error::transport(TRACE, e)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<FuturesOrdered<_>>()
            .try_collect()
            .await?;
        Ok(chunks.into_iter().flatten().collect())
    }

    fn trace_params(&self, hash: B256) -> Value {
        let options = GethDebugTracingOptions {
            tracer: Some(GethDebugTracerType::BuiltInTracer(
                GethDebugBuiltInTracerType::CallTracer,
            )),
            timeout: Some(self.trace_timeout.clone()),
            ..GethDebugTracingOptions::default()
        };
        json!([hash, options])
    }

    fn transaction(
        &self,
        tx: &SignedTransaction,
        (receipt, raw_receipt): (Receipt, Value),
        (trace, raw_trace): (CallTrace, Value),
        context: &BlockContext,
    ) -> Result<Transaction> {
        let operations = trace_flattener::flatten(tx, &receipt, &trace, context, &self.chain)?;

        let mut metadata = Metadata::new();
        metadata.insert("gas_limit".to_string(), json!(tx.gas()));
        if let Some(gas_price) = tx.gas_price() {
            metadata.insert("gas_price".to_string(), json!(gas_price));
        }
        metadata.insert(
            "effective_gas_price".to_string(),
            json!(fee::effective_gas_price(tx, &receipt)),
        );
        metadata.insert("type".to_string(), json!(U256::from(tx.tx_type())));
        metadata.insert("receipt".to_string(), raw_receipt);
        metadata.insert("trace".to_string(), raw_trace);

        Ok(Transaction {
            transaction_identifier: TransactionIdentifier {
                hash: tx.hash().to_string(),
            },
            operations,
            metadata: Some(metadata),
        })
    }
}

fn block_metadata(header: &RpcHeader, uncles: &[RpcHeader]) -> Metadata {
    let mut metadata = Map::new();
    metadata.insert("state_root".to_string(), json!(header.state_root));
    metadata.insert("transactions_root".to_string(), json!(header.transactions_root));
    metadata.insert("receipts_root".to_string(), json!(header.receipts_root));
    metadata.insert("difficulty".to_string(), json!(header.difficulty));
    metadata.insert("gas_limit".to_string(), json!(header.gas_limit));
    metadata.insert("gas_used".to_string(), json!(header.gas_used));
    if let Some(base_fee) = header.base_fee_per_gas {
        metadata.insert("base_fee".to_string(), json!(base_fee));
    }
    metadata.insert("miner".to_string(), json!(header.miner.to_checksum(None)));
    if !uncles.is_empty() {
        let uncles = uncles
            .iter()
            .enumerate()
            .map(|(index, uncle)| {
                json!({
                    "index": index,
                    "hash": uncle.hash,
                    "number": uncle.number(),
                    "miner": uncle.miner.to_checksum(None),
                })
            })
            .collect::<Vec<_>>();
        metadata.insert("uncles".to_string(), Value::Array(uncles));
    }
    metadata
}

/// Round-trip through the wire representation, so callers get exactly what
/// a consumer decoding our output would.
fn jsonify(block: Block) -> Result<Block> {
    let value = serde_path_to_error::serialize(&block, serde_json::value::Serializer).map_err(
        |source| Error::Decode {
            what: "block".to_string(),
            source,
        },
    )?;
    decode("block", value)
}

pub(crate) fn parse_block_hash(hash: &str) -> Result<B256> {
    hash.parse::<B256>().map_err(|e| Error::InvalidBlock {
        block: hash.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn describe_block(block: Option<&PartialBlockIdentifier>) -> String {
    match block {
        Some(PartialBlockIdentifier {
            hash: Some(hash), ..
        }) => hash.clone(),
        Some(PartialBlockIdentifier {
            index: Some(index), ..
        }) => index.to_string(),
        _ => "latest".to_string(),
    }
}
