mod common;

use common::Canned;
use futures::FutureExt as _;
use mockall::predicate::eq;
use op_rosetta::{
    config::ClientConfig,
    rosetta::{AccountIdentifier, BlockIdentifier, PartialBlockIdentifier},
    rpc::MockGraphQl,
    Client, Error, RequestContext,
};
use serde_json::{json, Value};

const ADDRESS: &str = "0x2f93B2f047E05cdf602820Ac4B3178efc2b43D55";
const HASH: &str = "0x9999286598edf07606228ba0233736e544a086a8822c61f9db3706887fc25dda";

fn query(clause: &str) -> String {
    format!(
        "{{ block({clause}) {{ hash number account(address: \"{ADDRESS}\") {{ balance transactionCount code }} }} }}"
    )
}

fn found() -> String {
    json!({
        "data": {
            "block": {
                "hash": HASH,
                "number": 8165,
                "account": {
                    "balance": "0x2324c0d180077fe7000",
                    "transactionCount": "0x0",
                    "code": "0x"
                }
            }
        }
    })
    .to_string()
}

fn graphql(clause: &str, response: String) -> MockGraphQl {
    let mut graphql = MockGraphQl::new();
    graphql
        .expect_query()
        .with(eq(query(clause)))
        .times(1)
        .returning(move |_| {
            let response = response.clone();
            async move { anyhow::Ok(response) }.boxed()
        });
    graphql
}

fn client(graphql: MockGraphQl) -> Client<Canned, MockGraphQl> {
    Client::new(Canned::new(), graphql, &ClientConfig::default())
}

fn account() -> AccountIdentifier {
    AccountIdentifier {
        address: ADDRESS.to_string(),
    }
}

#[tokio::test]
async fn latest() {
    let res = client(graphql("", found()))
        .balance(&RequestContext::new(), &account(), None)
        .await
        .unwrap();
    assert_eq!(
        res.block_identifier,
        BlockIdentifier {
            index: 8165,
            hash: HASH.to_string(),
        }
    );
    assert_eq!(res.balances.len(), 1);
    assert_eq!(res.balances[0].value, "10372550232136640000000");
    assert_eq!(res.balances[0].currency.symbol, "ETH");
    assert_eq!(
        res.metadata.map(Value::Object),
        Some(json!({"code": "0x", "nonce": 0}))
    );
}

#[tokio::test]
async fn by_hash_and_index() {
    let block = PartialBlockIdentifier {
        index: Some(8165),
        hash: Some(HASH.to_string()),
    };
    let res = client(graphql(&format!("hash: \"{HASH}\""), found()))
        .balance(&RequestContext::new(), &account(), Some(&block))
        .await
        .unwrap();
    assert_eq!(res.block_identifier.index, 8165);
}

#[tokio::test]
async fn by_index() {
    let block = PartialBlockIdentifier::by_index(8165);
    let res = client(graphql("number: 8165", found()))
        .balance(&RequestContext::new(), &account(), Some(&block))
        .await
        .unwrap();
    assert_eq!(res.block_identifier.hash, HASH);
}

#[tokio::test]
async fn latest_matches_head_by_hash() {
    let mut graphql = MockGraphQl::new();
    graphql
        .expect_query()
        .times(2)
        .returning(|_| async { anyhow::Ok(found()) }.boxed());
    let client = client(graphql);
    let ctx = RequestContext::new();

    let latest = client.balance(&ctx, &account(), None).await.unwrap();
    let pinned = PartialBlockIdentifier::by_hash(latest.block_identifier.hash.clone());
    let by_hash = client.balance(&ctx, &account(), Some(&pinned)).await.unwrap();
    assert_eq!(latest, by_hash);
}

#[tokio::test]
async fn disagreeing_hash_and_index() {
    let block = PartialBlockIdentifier {
        index: Some(1),
        hash: Some(HASH.to_string()),
    };
    let res = client(graphql(&format!("hash: \"{HASH}\""), found()))
        .balance(&RequestContext::new(), &account(), Some(&block))
        .await;
    assert!(matches!(res, Err(Error::InvalidBlock { .. })));
}

#[tokio::test]
async fn malformed_addresses_are_not_queried() {
    let res = client(MockGraphQl::new())
        .balance(
            &RequestContext::new(),
            &AccountIdentifier {
                address: "0x4cfc400fed52f9681b42454c2db4b18ab98f8de".to_string(),
            },
            None,
        )
        .await;
    assert!(matches!(res, Err(Error::InvalidAccount { .. })));
}

#[tokio::test]
async fn unknown_block() {
    let response = json!({
        "errors": [{"message": "header for hash not found"}],
        "data": {"block": null}
    });
    let block = PartialBlockIdentifier::by_hash(HASH);
    let res = client(graphql(&format!("hash: \"{HASH}\""), response.to_string()))
        .balance(&RequestContext::new(), &account(), Some(&block))
        .await;
    assert!(matches!(res, Err(Error::InvalidBlock { .. })));

    let response = json!({"data": {"block": null}});
    let res = client(graphql("number: 99999999", response.to_string()))
        .balance(
            &RequestContext::new(),
            &account(),
            Some(&PartialBlockIdentifier::by_index(99999999)),
        )
        .await;
    assert!(matches!(res, Err(Error::InvalidBlock { .. })));
}

#[tokio::test]
async fn pinned_block_missing_whatever_the_message() {
    let response = json!({
        "errors": [{"message": "header not found"}],
        "data": {"block": null}
    });
    let block = PartialBlockIdentifier::by_hash(HASH);
    let res = client(graphql(&format!("hash: \"{HASH}\""), response.to_string()))
        .balance(&RequestContext::new(), &account(), Some(&block))
        .await;
    match res {
        Err(Error::InvalidBlock { block, reason }) => {
            assert_eq!(block, HASH);
            assert_eq!(reason, "header not found");
        }
        other => panic!("unexpected {other:?}"),
    }

    // with nothing pinned the node's message is all there is
    let res = client(graphql("", response.to_string()))
        .balance(&RequestContext::new(), &account(), None)
        .await;
    assert!(matches!(res, Err(Error::GraphQl(message)) if message == "header not found"));
}

#[tokio::test]
async fn unknown_account() {
    let response = json!({
        "data": {"block": {"hash": HASH, "number": 8165, "account": null}}
    });
    let res = client(graphql("", response.to_string()))
        .balance(&RequestContext::new(), &account(), None)
        .await;
    match res {
        Err(Error::InvalidAccount { address, .. }) => assert_eq!(address, ADDRESS),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn transport_errors_are_surfaced() {
    let mut graphql = MockGraphQl::new();
    graphql
        .expect_query()
        .returning(|_| async { Err::<String, _>(anyhow::anyhow!("connection refused")) }.boxed());
    let res = client(graphql)
        .balance(&RequestContext::new(), &account(), None)
        .await;
    assert!(matches!(res, Err(Error::Transport { method: "graphql", .. })));
}
