//! Transport capabilities the client is built on.
//!
//! These are pure I/O boundaries: they move JSON to and from the node and
//! carry no chain logic. Errors are returned verbatim.

use futures::future::BoxFuture;
use mockall::automock;
use serde_json::Value;

mod http;
pub mod retry;
pub mod types;

pub use http::{HttpGraphQl, HttpJsonRpc};

/// One element of a batched JSON-RPC request.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchElem {
    pub method: &'static str,
    pub params: Value,
}

impl BatchElem {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self { method, params }
    }
}

/// Unary and batched JSON-RPC.
pub trait JsonRpc: Send + Sync {
    /// Issue a single call. A `null` result is returned as [`Value::Null`].
    fn call(
        &self,
        method: &'static str,
        params: Value,
    ) -> BoxFuture<'static, anyhow::Result<Value>>;

    /// Issue `batch` as one round trip.
    ///
    /// The outer error is a failure of the round trip itself. Otherwise the
    /// returned list has exactly one entry per element of `batch`, in the
    /// same order.
    fn batch_call(
        &self,
        batch: Vec<BatchElem>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<anyhow::Result<Value>>>>;
}

#[automock]
pub trait GraphQl: Send + Sync {
    /// Execute `document`, returning the raw response body (`data` and
    /// `errors`).
    fn query(&self, document: String) -> BoxFuture<'static, anyhow::Result<String>>;
}
