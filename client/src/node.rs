//! Thin passthroughs used when constructing and submitting transactions.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde_json::json;

use crate::{
    rpc::{GraphQl, JsonRpc},
    Client, RequestContext, Result,
};

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    /// The nonce `account` would use for its next transaction, counting the
    /// node's pending pool.
    pub async fn pending_nonce_at(&self, ctx: &RequestContext, account: Address) -> Result<u64> {
        let nonce: U64 = ctx
            .run(self.request("eth_getTransactionCount", json!([account, "pending"])))
            .await?;
        Ok(nonce.to::<u64>())
    }

    pub async fn nonce_at(
        &self,
        ctx: &RequestContext,
        account: Address,
        block: u64,
    ) -> Result<u64> {
        let nonce: U64 = ctx
            .run(self.request(
                "eth_getTransactionCount",
                json!([account, format!("{block:#x}")]),
            ))
            .await?;
        Ok(nonce.to::<u64>())
    }

    pub async fn suggest_gas_price(&self, ctx: &RequestContext) -> Result<U256> {
        ctx.run(self.request("eth_gasPrice", json!([]))).await
    }

    /// Broadcast a signed, EIP-2718 encoded transaction. The node's error,
    /// if any, is returned verbatim.
    pub async fn send_raw_transaction(&self, ctx: &RequestContext, raw: &Bytes) -> Result<B256> {
        ctx.run(self.request("eth_sendRawTransaction", json!([raw])))
            .await
    }
}
