//! Retries for the HTTP JSON-RPC transport.
//!
//! Only transport-level failures (connection errors, HTTP error statuses) are
//! retried. Error responses from the node, such as a reverted `eth_call`,
//! are final and reach the caller verbatim.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use alloy::{
    rpc::{
        client::{ClientBuilder, RpcClient},
        json_rpc::{RequestPacket, ResponsePacket},
    },
    transports::{http::ReqwestTransport, TransportError},
};
use tower::{retry::Policy, Layer, Service};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    backoff: Duration,
    attempt: u32,
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            attempt: 0,
            max_retries,
        }
    }

    fn should_retry(&self, result: Result<&ResponsePacket, &TransportError>) -> bool {
        matches!(result, Err(TransportError::Transport(_))) && self.attempt < self.max_retries
    }
}

impl Policy<RequestPacket, ResponsePacket, TransportError> for RetryPolicy {
    type Future = Pin<Box<dyn Future<Output = Self> + Send + 'static>>;

    fn retry(
        &self,
        _req: &RequestPacket,
        result: Result<&ResponsePacket, &TransportError>,
    ) -> Option<Self::Future> {
        if !self.should_retry(result) {
            return None;
        }
        if let Err(e) = result {
            warn!(attempt = self.attempt + 1, "retrying rpc request: {e}");
        }
        let mut next = self.clone();
        Some(Box::pin(async move {
            tokio::time::sleep(next.backoff).await;
            next.attempt += 1;
            next
        }))
    }

    fn clone_request(&self, req: &RequestPacket) -> Option<RequestPacket> {
        Some(req.clone())
    }
}

#[derive(Clone, Debug)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<RequestPacket> for RetryService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Send
        + 'static
        + Clone,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        // the clone may not be ready, so keep the polled service for this call
        let fresh = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, fresh);
        let mut policy = self.policy.clone();

        Box::pin(async move {
            let mut res = inner.call(req.clone()).await;
            while let Some(next) = policy.retry(&req, res.as_ref()) {
                policy = next.await;
                res = inner.call(req.clone()).await;
            }
            res
        })
    }
}

/// An HTTP JSON-RPC client retrying transport failures `max_retries` times,
/// `backoff` apart.
pub fn build_http_retry_client(
    rpc_url: url::Url,
    backoff: Duration,
    max_retries: u32,
) -> RpcClient<RetryService<ReqwestTransport>> {
    let retry = RetryLayer::new(RetryPolicy::new(backoff, max_retries));
    ClientBuilder::default().layer(retry).http(rpc_url)
}

#[cfg(test)]
mod tests {
    use alloy::transports::TransportErrorKind;

    use super::*;

    #[test]
    fn only_transport_failures_are_retried() {
        let policy = RetryPolicy::new(Duration::ZERO, 1);
        let dropped = TransportErrorKind::backend_gone();
        assert!(policy.should_retry(Err(&dropped)));

        let reverted = TransportError::local_usage_str("execution reverted");
        assert!(!policy.should_retry(Err(&reverted)));

        let exhausted = RetryPolicy {
            attempt: 1,
            ..policy
        };
        assert!(!exhausted.should_retry(Err(&dropped)));
    }
}
