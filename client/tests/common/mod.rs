//! An in-process node for exercising the client end to end.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt as _};
use op_rosetta::{
    config::ClientConfig,
    rpc::{BatchElem, JsonRpc, MockGraphQl},
    Client,
};
use serde::Serialize;
use serde_json::{json, Value};

pub const MINER: &str = "0x4200000000000000000000000000000000000011";
pub const SENDER: &str = "0x00000000000000000000000000000000000000aa";
pub const RECIPIENT: &str = "0x00000000000000000000000000000000000000bb";
pub const CONTRACT: &str = "0x00000000000000000000000000000000000000cc";
pub const CHILD: &str = "0x00000000000000000000000000000000000000dd";
pub const BENEFICIARY: &str = "0x00000000000000000000000000000000000000ee";

pub const BLOCK_HASH: &str = "0xba9ded5ca1ec9adb9451bf062c9de309d9552fa0f0254a7b982d3daf7ae436ae";
pub const PARENT_HASH: &str = "0x48269a339ce1489cff6bab70eff432289c4f490b81dbd00ff1f81c68de06b842";
pub const UNCLE_HASH: &str = "0x6cf7b0d3c2e6ba6d8b9e1c1ee2ee2c1ba0fcb1b96b1d60aa3b73e3a3d62b0d4b";

/// `n` distinct, well-formed transaction hashes.
pub fn tx_hash(n: u64) -> String {
    format!("0x{:064x}", 0x5e77_0000 + n)
}

struct Response {
    result: Result<Value, String>,
    delay: Duration,
}

#[derive(Default)]
struct State {
    responses: Mutex<BTreeMap<(String, String), Response>>,
    requests: Mutex<Vec<(String, Value)>>,
    batch_sizes: Mutex<Vec<usize>>,
    traces_in_flight: AtomicUsize,
    max_traces_in_flight: AtomicUsize,
}

/// A [`JsonRpc`] answering from canned responses, keyed by method and exact
/// params, and recording every request it sees.
#[derive(Clone, Default)]
pub struct Canned {
    state: Arc<State>,
}

impl Canned {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    fn insert(
        self,
        method: &str,
        params: Value,
        result: Result<Value, String>,
        delay: Duration,
    ) -> Self {
        let clobbered = self.state.responses.lock().unwrap().insert(
            (method.to_string(), params.to_string()),
            Response { result, delay },
        );
        assert!(
            clobbered.is_none(),
            "duplicate response registered - this is probably not what you want"
        );
        self
    }

    #[track_caller]
    pub fn respond(self, method: &str, params: Value, response: impl Serialize) -> Self {
        let response = serde_json::to_value(response).expect("serialization failure");
        self.insert(method, params, Ok(response), Duration::ZERO)
    }

    #[track_caller]
    pub fn respond_after(
        self,
        delay: Duration,
        method: &str,
        params: Value,
        response: impl Serialize,
    ) -> Self {
        let response = serde_json::to_value(response).expect("serialization failure");
        self.insert(method, params, Ok(response), delay)
    }

    #[track_caller]
    pub fn fail(self, method: &str, params: Value, message: &str) -> Self {
        self.insert(method, params, Err(message.to_string()), Duration::ZERO)
    }

    /// Every request so far, batch elements included, in arrival order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|(method, _)| method).collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.batch_sizes.lock().unwrap().clone()
    }

    /// The most `debug_traceTransaction` requests ever outstanding at once.
    pub fn max_traces_in_flight(&self) -> usize {
        self.state.max_traces_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, method: &str, params: &Value) -> (anyhow::Result<Value>, Duration) {
        self.state
            .requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match self
            .state
            .responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), params.to_string()))
        {
            Some(Response { result, delay }) => (
                result.clone().map_err(|e| anyhow::anyhow!(e)),
                *delay,
            ),
            None => (
                Err(anyhow::anyhow!("method {method} not implemented")),
                Duration::ZERO,
            ),
        }
    }

    fn enter(&self, method: &str, units: usize) -> InFlight {
        let units = if method == "debug_traceTransaction" { units } else { 0 };
        let now = self.state.traces_in_flight.fetch_add(units, Ordering::SeqCst) + units;
        self.state
            .max_traces_in_flight
            .fetch_max(now, Ordering::SeqCst);
        InFlight {
            state: self.state.clone(),
            units,
        }
    }
}

/// Leaves the in-flight count when the request completes or is dropped.
struct InFlight {
    state: Arc<State>,
    units: usize,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state
            .traces_in_flight
            .fetch_sub(self.units, Ordering::SeqCst);
    }
}

impl JsonRpc for Canned {
    fn call(
        &self,
        method: &'static str,
        params: Value,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        let this = self.clone();
        async move {
            let _in_flight = this.enter(method, 1);
            let (result, delay) = this.lookup(method, &params);
            tokio::time::sleep(delay).await;
            result
        }
        .boxed()
    }

    fn batch_call(
        &self,
        batch: Vec<BatchElem>,
    ) -> BoxFuture<'static, anyhow::Result<Vec<anyhow::Result<Value>>>> {
        let this = self.clone();
        async move {
            this.state.batch_sizes.lock().unwrap().push(batch.len());
            let _in_flight = batch
                .first()
                .map(|it| this.enter(it.method, batch.len()));
            let mut slowest = Duration::ZERO;
            let mut results = Vec::with_capacity(batch.len());
            for elem in &batch {
                let (result, delay) = this.lookup(elem.method, &elem.params);
                slowest = slowest.max(delay);
                results.push(result);
            }
            tokio::time::sleep(slowest).await;
            Ok(results)
        }
        .boxed()
    }
}

/// A client over `rpc` whose GraphQL endpoint must not be touched.
pub fn client(rpc: Canned, config: ClientConfig) -> Client<Canned, MockGraphQl> {
    Client::new(rpc, MockGraphQl::new(), &config)
}

pub fn trace_params(hash: &str) -> Value {
    json!([hash, { "tracer": "callTracer", "timeout": "120s" }])
}

pub fn header(number: u64, uncles: &[&str]) -> Value {
    json!({
        "hash": BLOCK_HASH,
        "parentHash": PARENT_HASH,
        "number": format!("{number:#x}"),
        "timestamp": "0x5f8f466b",
        "miner": MINER,
        "stateRoot": "0x3b8b35a0e5a6b0b1a8e2b4bf1f1e6e05b61e1b2b4e7a5c1c3b6a1b0e8e2f3d4c",
        "transactionsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        "receiptsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        "difficulty": "0x0",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x5208",
        "baseFeePerGas": "0x3b9ac9ff",
        "uncles": uncles,
    })
}

pub fn block(number: u64, transactions: Vec<Value>, uncles: &[&str]) -> Value {
    let mut block = header(number, uncles);
    block["transactions"] = Value::Array(transactions);
    block
}

pub fn transaction(hash: &str, to: &str, value: &str) -> Value {
    json!({
        "hash": hash,
        "nonce": "0x1",
        "from": SENDER,
        "to": to,
        "value": value,
        "gas": "0x30d40",
        "gasPrice": "0x3b9aca00",
        "maxFeePerGas": "0x3b9aca00",
        "maxPriorityFeePerGas": "0x1",
        "input": "0x",
        "type": "0x2",
        "chainId": "0xa",
        "accessList": [],
        "v": "0x0",
        "r": "0x1",
        "s": "0x1",
        "yParity": "0x0"
    })
}

/// A receipt whose L1 fee is reported, so no recomputation happens.
pub fn receipt(hash: &str, status: &str) -> Value {
    json!({
        "transactionHash": hash,
        "blockHash": BLOCK_HASH,
        "status": status,
        "gasUsed": "0x5208",
        "cumulativeGasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "contractAddress": null,
        "logs": [],
        "l1GasPrice": "0x5f5e100",
        "l1GasUsed": "0x640",
        "l1Fee": "0x2540be400",
        "l1FeeScalar": "0.684"
    })
}

pub fn transfer_trace(to: &str, value: &str) -> Value {
    json!({
        "type": "CALL",
        "from": SENDER,
        "to": to,
        "value": value,
        "gas": "0x30d40",
        "gasUsed": "0x5208",
        "input": "0x"
    })
}

/// Fills in the `input` that `callTracer` always reports and hand-written
/// frames leave out.
pub fn with_inputs(mut frame: Value) -> Value {
    if let Some(object) = frame.as_object_mut() {
        object.entry("input").or_insert_with(|| json!("0x"));
        if let Some(Value::Array(calls)) = object.get_mut("calls") {
            for call in calls.iter_mut() {
                *call = with_inputs(call.take());
            }
        }
    }
    frame
}

/// A block of simple transfers, one per hash, with all receipts and traces
/// canned.
pub fn transfers(number: u64, hashes: &[String]) -> Canned {
    let txs = hashes
        .iter()
        .map(|hash| transaction(hash, RECIPIENT, "0x1"))
        .collect();
    let mut rpc = Canned::new().respond(
        "eth_getBlockByNumber",
        json!([format!("{number:#x}"), true]),
        block(number, txs, &[]),
    );
    for hash in hashes {
        rpc = rpc
            .respond("eth_getTransactionReceipt", json!([hash]), receipt(hash, "0x1"))
            .respond(
                "debug_traceTransaction",
                trace_params(hash),
                transfer_trace(RECIPIENT, "0x1"),
            );
    }
    rpc
}
