//! Serve a rollup node's chain state in the Rosetta data model.
//!
//! [`Client`] sits on top of two transport capabilities, [`rpc::JsonRpc`] and
//! [`rpc::GraphQl`], and exposes four entry points:
//! - [`Client::status`]: head block, sync progress and peers.
//! - [`Client::balance`]: balance, nonce and code at a pinned block, in a
//!   single GraphQL query.
//! - [`Client::block`]: a fully flattened block, assembled from the block
//!   body, receipts and per-transaction call traces.
//! - [`Client::call`]: a validated passthrough to a small set of read-only
//!   RPC methods.
//!
//! Every entry point takes a [`RequestContext`], and fails with
//! [`Error::Canceled`] or [`Error::DeadlineExceeded`] rather than returning
//! partial data.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]

mod balance;
mod block;
mod call;
mod client;
pub mod config;
mod context;
mod error;
pub mod limiter;
mod node;
pub mod rpc;
mod status;
pub mod tracing;

pub use call::CallMethod;
pub use client::Client;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use status::NodeStatus;
pub use trace_flattener::{rosetta, ChainConfig};
