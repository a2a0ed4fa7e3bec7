use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use trace_flattener::ChainConfig;

use crate::{
    config::{ClientConfig, EndpointConfig},
    error::decode,
    limiter::TraceLimiter,
    rpc::{BatchElem, GraphQl, HttpGraphQl, HttpJsonRpc, JsonRpc},
    Error, Result,
};

/// Everything a request needs, constructed once and shared by reference.
///
/// The limiter is the only state that changes after construction.
pub struct Client<RpcT = HttpJsonRpc, GraphT = HttpGraphQl> {
    pub(crate) rpc: RpcT,
    pub(crate) graphql: GraphT,
    pub(crate) limiter: TraceLimiter,
    pub(crate) chain: ChainConfig,
    pub(crate) trace_timeout: String,
    pub(crate) batch_traces: bool,
    pub(crate) skip_admin_calls: bool,
}

impl<RpcT, GraphT> fmt::Debug for Client<RpcT, GraphT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("limiter", &self.limiter)
            .field("chain", &self.chain)
            .field("trace_timeout", &self.trace_timeout)
            .field("batch_traces", &self.batch_traces)
            .field("skip_admin_calls", &self.skip_admin_calls)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client talking to the node over HTTP.
    pub fn connect(endpoints: &EndpointConfig, config: &ClientConfig) -> Self {
        Self::new(
            HttpJsonRpc::new(
                endpoints.rpc_url.clone(),
                endpoints.backoff(),
                endpoints.max_retries,
            ),
            HttpGraphQl::new(endpoints.graphql_url.clone()),
            config,
        )
    }
}

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    pub fn new(rpc: RpcT, graphql: GraphT, config: &ClientConfig) -> Self {
        Self {
            rpc,
            graphql,
            limiter: TraceLimiter::new(config.trace_capacity),
            chain: config.chain_config(),
            trace_timeout: config.trace_timeout.clone(),
            batch_traces: config.batch_traces,
            skip_admin_calls: config.skip_admin_calls,
        }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn limiter(&self) -> &TraceLimiter {
        &self.limiter
    }

    pub(crate) async fn call_raw(&self, method: &'static str, params: Value) -> Result<Value> {
        debug!(method, %params, "rpc call");
        self.rpc
            .call(method, params)
            .await
            .map_err(|e| Error::transport(method, e))
    }

    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T> {
        decode(method, self.call_raw(method, params).await?)
    }

    /// Results are positional, one per element of `batch`.
    pub(crate) async fn batch_call(
        &self,
        batch: Vec<BatchElem>,
    ) -> Result<Vec<anyhow::Result<Value>>> {
        let Some(method) = batch.first().map(|it| it.method) else {
            return Ok(vec![]);
        };
        let len = batch.len();
        debug!(method, len, "rpc batch");
        let results = self
            .rpc
            .batch_call(batch)
            .await
            .map_err(|e| Error::transport(method, e))?;
        if results.len() != len {
            return Err(Error::transport(
                method,
                anyhow::anyhow!("batch of {len} returned {} results", results.len()),
            ));
        }
        Ok(results)
    }
}
