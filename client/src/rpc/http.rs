use std::time::Duration;

use alloy::{
    rpc::client::{BatchRequest, RpcClient},
    transports::http::{reqwest, ReqwestTransport},
};
use anyhow::Context as _;
use futures::{future::BoxFuture, FutureExt as _};
use serde_json::{json, Value};
use url::Url;

use super::{
    retry::{build_http_retry_client, RetryService},
    BatchElem, GraphQl, JsonRpc,
};

/// JSON-RPC over HTTP, with retries on transport failures.
#[derive(Clone, Debug)]
pub struct HttpJsonRpc {
    client: RpcClient<RetryService<ReqwestTransport>>,
}

impl HttpJsonRpc {
    pub fn new(url: Url, backoff: Duration, max_retries: u32) -> Self {
        Self {
            client: build_http_retry_client(url, backoff, max_retries),
        }
    }
}

impl JsonRpc for HttpJsonRpc {
    fn call(
        &self,
        method: &'static str,
        params: Value,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        let client = self.client.clone();
        async move {
            let res: Value = client.request(method, params).await?;
            Ok(res)
        }
        .boxed()
    }

    fn batch_call(
        &self,
        batch: Vec<BatchElem>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<anyhow::Result<Value>>>> {
        let client = self.client.clone();
        async move {
            if batch.is_empty() {
                return Ok(vec![]);
            }
            let mut request = BatchRequest::new(&client);
            let waiters = batch
                .iter()
                .map(|elem| request.add_call::<_, Value>(elem.method, &elem.params))
                .collect::<Result<Vec<_>, _>>()?;
            request.send().await?;

            let mut results = Vec::with_capacity(waiters.len());
            for waiter in waiters {
                results.push(waiter.await.map_err(anyhow::Error::from));
            }
            Ok(results)
        }
        .boxed()
    }
}

/// GraphQL over HTTP POST.
#[derive(Clone, Debug)]
pub struct HttpGraphQl {
    client: reqwest::Client,
    url: Url,
}

impl HttpGraphQl {
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl GraphQl for HttpGraphQl {
    fn query(&self, document: String) -> BoxFuture<'static, anyhow::Result<String>> {
        let (client, url) = (self.client.clone(), self.url.clone());
        async move {
            let body = serde_json::to_vec(&json!({ "query": document }))?;
            let response = client
                .post(url)
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
                .context("graphql request failed")?
                .error_for_status()?;
            Ok(response.text().await?)
        }
        .boxed()
    }
}
