use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use trace_flattener::rosetta::{BlockIdentifier, Peer, SyncStatus};

use crate::{
    rpc::{
        types::{PeerInfo, RpcHeader, SyncingResult},
        GraphQl, JsonRpc,
    },
    Client, Error, RequestContext, Result,
};

/// Liveness of the node, as of its head block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub current_block_identifier: BlockIdentifier,
    /// Milliseconds since the unix epoch.
    pub current_block_timestamp: i64,
    /// `None` when administrative calls are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    /// `None` when administrative calls are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<Peer>>,
}

impl<RpcT, GraphT> Client<RpcT, GraphT>
where
    RpcT: JsonRpc,
    GraphT: GraphQl,
{
    /// The node's head block, sync progress and peers.
    ///
    /// Fails with [`Error::NotFound`] while the node has no head block, which
    /// is expected during startup.
    pub async fn status(&self, ctx: &RequestContext) -> Result<NodeStatus> {
        ctx.run(async {
            let head = self
                .call_raw("eth_getBlockByNumber", json!(["latest", false]))
                .await?;
            if head.is_null() {
                return Err(Error::NotFound);
            }
            let head: RpcHeader = crate::error::decode("head block", head)?;
            let current_block_identifier = BlockIdentifier {
                index: head.number(),
                hash: head.hash.to_string(),
            };

            let (sync_status, peers) = if self.skip_admin_calls {
                (None, None)
            } else {
                let (syncing, peers) = futures::try_join!(
                    self.request::<SyncingResult>("eth_syncing", json!([])),
                    self.request::<Vec<PeerInfo>>("admin_peers", json!([])),
                )?;
                debug!(peers = peers.len(), "node is up");
                (
                    Some(sync_status(syncing, head.number())),
                    Some(peers.into_iter().map(peer).collect()),
                )
            };

            Ok(NodeStatus {
                current_block_identifier,
                current_block_timestamp: head.timestamp_millis(),
                sync_status,
                peers,
            })
        })
        .await
    }
}

fn sync_status(syncing: SyncingResult, head: u64) -> SyncStatus {
    match syncing {
        SyncingResult::NotSyncing(_) => SyncStatus {
            current_index: Some(head),
            target_index: Some(head),
            synced: Some(true),
        },
        SyncingResult::Syncing(progress) => SyncStatus {
            current_index: Some(progress.current_block.to::<u64>()),
            target_index: Some(progress.highest_block.to::<u64>()),
            synced: Some(false),
        },
    }
}

fn peer(info: PeerInfo) -> Peer {
    let mut metadata = Map::new();
    if let Some(name) = info.name {
        metadata.insert("name".to_string(), Value::String(name));
    }
    if let Some(enode) = info.enode {
        metadata.insert("enode".to_string(), Value::String(enode));
    }
    metadata.insert("caps".to_string(), json!(info.caps));
    if !info.protocols.is_null() {
        metadata.insert("protocols".to_string(), info.protocols);
    }
    Peer {
        peer_id: info.id,
        metadata: Some(metadata),
    }
}
