//! Validated passthrough to a fixed set of read-only node methods.
//!
//! Every method has a typed parameter schema. Unknown methods, unknown keys,
//! missing keys and malformed values are all rejected before anything is sent
//! to the node.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use trace_flattener::rosetta::{CallRequest, CallResponse, Metadata};

use crate::{
    rpc::{types::Quantity, GraphQl, JsonRpc},
    Client, Error, RequestContext, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallMethod {
    GetBlockByNumber,
    GetTransactionReceipt,
    Call,
    EstimateGas,
}

impl CallMethod {
    pub const ALL: [Self; 4] = [
        Self::GetBlockByNumber,
        Self::GetTransactionReceipt,
        Self::Call,
        Self::EstimateGas,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::GetBlockByNumber => "eth_getBlockByNumber",
            Self::GetTransactionReceipt => "eth_getTransactionReceipt",
            Self::Call => "eth_call",
            Self::EstimateGas => "eth_estimateGas",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|it| it.name() == name)
    }

    /// Whether repeating the call is guaranteed to give the same result.
    ///
    /// Gas estimates depend on the pending state, so they never are. An
    /// `eth_call` is only when it is pinned to a block.
    pub const fn idempotent(self) -> bool {
        !matches!(self, Self::EstimateGas)
    }
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockByNumberParams {
    index: u64,
    #[serde(default)]
    show_transaction_details: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReceiptParams {
    tx_hash: B256,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallParams {
    #[serde(default)]
    index: Option<u64>,
    #[serde(default)]
    hash: Option<B256>,
    #[serde(default)]
    from: Option<Address>,
    to: Address,
    #[serde(default)]
    gas: Option<Quantity>,
    #[serde(default)]
    gas_price: Option<Quantity>,
    #[serde(default)]
    value: Option<Quantity>,
    #[serde(default)]
    data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EstimateGasParams {
    from: Address,
    to: Address,
    #[serde(default)]
    data: Option<Bytes>,
}

/// A request that passed validation, ready to send.
#[derive(Debug, PartialEq)]
struct Validated {
    method: CallMethod,
    params: Value,
    idempotent: bool,
}

fn parse<T: DeserializeOwned>(method: CallMethod, parameters: &Metadata) -> Result<T> {
    serde_path_to_error::deserialize(Value::Object(parameters.clone())).map_err(|e| {
        Error::ParametersInvalid {
            method: method.name().to_string(),
            reason: e.to_string(),
        }
    })
}

fn validate(request: &CallRequest) -> Result<Validated> {
    let method = CallMethod::from_name(&request.method)
        .ok_or_else(|| Error::MethodInvalid(request.method.clone()))?;
    let parameters = &request.parameters;

    let (params, idempotent) = match method {
        CallMethod::GetBlockByNumber => {
            let BlockByNumberParams {
                index,
                show_transaction_details,
            } = parse(method, parameters)?;
            (json!([format!("{index:#x}"), show_transaction_details]), true)
        }
        CallMethod::GetTransactionReceipt => {
            let ReceiptParams { tx_hash } = parse(method, parameters)?;
            (json!([tx_hash]), true)
        }
        CallMethod::Call => {
            let params: CallParams = parse(method, parameters)?;
            let block = match (params.index, params.hash) {
                (Some(_), Some(_)) => {
                    return Err(Error::ParametersInvalid {
                        method: method.name().to_string(),
                        reason: "at most one of `index` and `hash` may be given".to_string(),
                    })
                }
                (Some(index), None) => json!(format!("{index:#x}")),
                (None, Some(hash)) => json!({ "blockHash": hash }),
                (None, None) => json!("latest"),
            };
            let pinned = params.index.is_some() || params.hash.is_some();

            let mut call = Map::new();
            if let Some(from) = params.from {
                call.insert("from".to_string(), json!(from));
            }
            call.insert("to".to_string(), json!(params.to));
            for (key, quantity) in [
                ("gas", params.gas),
                ("gasPrice", params.gas_price),
                ("value", params.value),
            ] {
                if let Some(quantity) = quantity {
                    call.insert(key.to_string(), json!(quantity.to_u256()));
                }
            }
            if let Some(data) = params.data {
                call.insert("data".to_string(), json!(data));
            }
            (json!([call, block]), pinned)
        }
        CallMethod::EstimateGas => {
            let EstimateGasParams { from, to, data } = parse(method, parameters)?;
            let mut call = Map::new();
            call.insert("from".to_string(), json!(from));
            call.insert("to".to_string(), json!(to));
            if let Some(data) = data {
                call.insert("data".to_string(), json!(data));
            }
            (json!([call]), false)
        }
    };

    Ok(Validated {
        method,
        params,
        idempotent: idempotent && method.idempotent(),
    })
}

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    /// Forward `request` to the node, if it names an allowed method with
    /// well-formed parameters.
    ///
    /// Block and receipt lookups return the node's object as is. `eth_call`
    /// and `eth_estimateGas` return `{"data": <result>}`.
    pub async fn call(&self, ctx: &RequestContext, request: &CallRequest) -> Result<CallResponse> {
        let Validated {
            method,
            params,
            idempotent,
        } = validate(request)?;

        let raw = ctx.run(self.call_raw(method.name(), params)).await?;
        let result = match (method, raw) {
            (_, Value::Null) => return Err(Error::NotFound),
            (
                CallMethod::GetBlockByNumber | CallMethod::GetTransactionReceipt,
                Value::Object(result),
            ) => result,
            (CallMethod::Call | CallMethod::EstimateGas, data) => {
                let mut result = Map::new();
                result.insert("data".to_string(), data);
                result
            }
            (_, other) => {
                return Err(Error::transport(
                    method.name(),
                    anyhow::anyhow!("expected an object, got {other}"),
                ))
            }
        };
        Ok(CallResponse { result, idempotent })
    }
}
