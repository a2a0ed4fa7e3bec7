use alloy::primitives::{Address, Bytes, B256};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use trace_flattener::rosetta::{
    AccountBalanceResponse, AccountIdentifier, Amount, BlockIdentifier, PartialBlockIdentifier,
};

use crate::{
    block::{describe_block, parse_block_hash},
    error::decode,
    rpc::{types::Quantity, GraphQl, JsonRpc},
    Client, Error, RequestContext, Result,
};

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Data {
    block: Option<BlockResult>,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    hash: B256,
    number: Quantity,
    account: Option<AccountResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResult {
    balance: Quantity,
    transaction_count: Quantity,
    code: Bytes,
}

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    /// Balance, nonce and code of `account`, read atomically at one block.
    ///
    /// With no `block` the node's latest block is used. When both a hash and
    /// an index are given the block is addressed by hash, and an index that
    /// disagrees with it is an [`Error::InvalidBlock`].
    pub async fn balance(
        &self,
        ctx: &RequestContext,
        account: &AccountIdentifier,
        block: Option<&PartialBlockIdentifier>,
    ) -> Result<AccountBalanceResponse> {
        let address: Address = account.address.parse::<Address>().map_err(|e| Error::InvalidAccount {
            address: account.address.clone(),
            reason: e.to_string(),
        })?;
        let document = balance_query(address, block)?;

        ctx.run(async {
            debug!(%address, "balance query");
            let raw = self
                .graphql
                .query(document)
                .await
                .map_err(|e| Error::transport("graphql", e))?;
            let value: Value = serde_json::from_str(&raw).map_err(|e| {
                Error::transport("graphql", anyhow::Error::new(e).context("malformed response"))
            })?;
            let response: Response = decode("balance response", value)?;
            self.balance_response(&account.address, block, response)
        })
        .await
    }

    fn balance_response(
        &self,
        address: &str,
        requested: Option<&PartialBlockIdentifier>,
        response: Response,
    ) -> Result<AccountBalanceResponse> {
        let describe = || describe_block(requested);
        let Response { data, errors } = response;
        let block = data.and_then(|it| it.block);

        // a pinned block that didn't resolve is the block's fault, whatever
        // the node says about it
        let pinned = requested.is_some_and(|it| it.hash.is_some() || it.index.is_some());
        if pinned && block.is_none() {
            return Err(Error::InvalidBlock {
                block: describe(),
                reason: errors
                    .into_iter()
                    .next()
                    .map_or_else(|| "no such block".to_string(), |it| it.message),
            });
        }

        if let Some(error) = errors.first() {
            let message = error.message.clone();
            return Err(if message.contains("account") || message.contains("address") {
                Error::InvalidAccount {
                    address: address.to_string(),
                    reason: message,
                }
            } else if message.contains("block") || message.contains("hash") {
                Error::InvalidBlock {
                    block: describe(),
                    reason: message,
                }
            } else {
                Error::GraphQl(message)
            });
        }

        let Some(block) = block else {
            return Err(Error::InvalidBlock {
                block: describe(),
                reason: "no such block".to_string(),
            });
        };
        let index = block.number.to_u64().ok_or_else(|| Error::InvalidBlock {
            block: describe(),
            reason: "block number out of range".to_string(),
        })?;
        if let Some(expected) = requested.and_then(|it| it.index) {
            if expected != index {
                return Err(Error::InvalidBlock {
                    block: describe(),
                    reason: format!("hash resolves to block {index}"),
                });
            }
        }
        let Some(account) = block.account else {
            return Err(Error::InvalidAccount {
                address: address.to_string(),
                reason: "no such account".to_string(),
            });
        };

        let nonce = account
            .transaction_count
            .to_u64()
            .ok_or_else(|| Error::GraphQl("transaction count out of range".to_string()))?;
        let mut metadata = Map::new();
        metadata.insert("code".to_string(), json!(account.code));
        metadata.insert("nonce".to_string(), json!(nonce));

        Ok(AccountBalanceResponse {
            block_identifier: BlockIdentifier {
                index,
                hash: block.hash.to_string(),
            },
            balances: vec![Amount::credit(account.balance.to_u256(), &self.chain.currency)],
            metadata: Some(metadata),
        })
    }
}

/// One query for the balance, nonce and code of `address`. The hash wins
/// over the index.
fn balance_query(address: Address, block: Option<&PartialBlockIdentifier>) -> Result<String> {
    let clause = match block {
        Some(PartialBlockIdentifier {
            hash: Some(hash), ..
        }) => {
            format!("hash: \"{}\"", parse_block_hash(hash)?)
        }
        Some(PartialBlockIdentifier {
            index: Some(index), ..
        }) => format!("number: {index}"),
        _ => String::new(),
    };
    let address = address.to_checksum(None);
    Ok(format!(
        "{{ block({clause}) {{ hash number account(address: \"{address}\") {{ balance transactionCount code }} }} }}"
    ))
}
