use std::io;

use alloy::primitives::{Address, Bytes};
use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueHint};
use op_rosetta::{
    config::{load_env_file, ClientConfig, EndpointConfig},
    rosetta::{AccountIdentifier, CallRequest, PartialBlockIdentifier},
    Client, RequestContext,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Subcommand)]
enum Command {
    /// Head block, sync progress and peers.
    Status,
    /// Balance, nonce and code of an account.
    Balance {
        #[arg(value_hint = ValueHint::Other)]
        address: String,
        #[command(flatten)]
        block: BlockArgs,
    },
    /// A fully flattened block.
    Block {
        #[command(flatten)]
        block: BlockArgs,
    },
    /// Forward one of the allowed read-only methods.
    Call {
        method: String,
        /// A JSON object of named parameters.
        #[arg(default_value = "{}")]
        parameters: String,
    },
    /// The next nonce of an account, counting pending transactions.
    Nonce { address: Address },
    /// The node's suggested gas price.
    GasPrice,
    /// Broadcast a signed, hex encoded transaction.
    Send { raw: Bytes },
}

#[derive(clap::Args)]
struct BlockArgs {
    /// Block number.
    #[arg(long)]
    index: Option<u64>,
    /// Block hash. Takes precedence over the number.
    #[arg(long)]
    hash: Option<String>,
}

impl BlockArgs {
    fn partial(self) -> Option<PartialBlockIdentifier> {
        match (self.index, self.hash) {
            (None, None) => None,
            (index, hash) => Some(PartialBlockIdentifier { index, hash }),
        }
    }
}

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointConfig,
    #[command(flatten)]
    config: ClientConfig,
    #[command(subcommand)]
    command: Command,
}

fn print(value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(io::stdout(), value)?;
    println!();
    Ok(())
}

impl Cli {
    async fn execute(self, ctx: RequestContext) -> anyhow::Result<()> {
        let client = Client::connect(&self.endpoints, &self.config);
        info!(rpc = %self.endpoints.rpc_url, "connecting");

        match self.command {
            Command::Status => print(&client.status(&ctx).await?),
            Command::Balance { address, block } => {
                let account = AccountIdentifier { address };
                print(
                    &client
                        .balance(&ctx, &account, block.partial().as_ref())
                        .await?,
                )
            }
            Command::Block { block } => {
                print(&client.block(&ctx, block.partial().as_ref()).await?)
            }
            Command::Call { method, parameters } => {
                let parameters = match serde_json::from_str(&parameters)
                    .context("parameters must be a JSON object")?
                {
                    Value::Object(it) => it,
                    other => anyhow::bail!("parameters must be a JSON object, got {other}"),
                };
                print(&client.call(&ctx, &CallRequest { method, parameters }).await?)
            }
            Command::Nonce { address } => print(&client.pending_nonce_at(&ctx, address).await?),
            Command::GasPrice => print(&client.suggest_gas_price(&ctx).await?),
            Command::Send { raw } => print(&client.send_raw_transaction(&ctx, &raw).await?),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_env_file();
    op_rosetta::tracing::init();
    env_file.log();

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                token.cancel();
            }
        }
    });

    Cli::parse()
        .execute(RequestContext::with_token(token))
        .await
}
