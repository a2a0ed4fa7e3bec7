//! Process configuration, from flags, the environment, or a local `.env`.

use std::{io, path::PathBuf, time::Duration};

use alloy::primitives::Address;
use clap::Args;
use trace_flattener::{
    fee, rosetta::Currency, ChainConfig, BASE_FEE_VAULT, FJORD_TIME, L1_FEE_VAULT,
};
use url::Url;

use crate::limiter::DEFAULT_CAPACITY;

/// Where the node is, and how hard to try reaching it.
#[derive(Args, Clone, Debug)]
pub struct EndpointConfig {
    /// The node's JSON-RPC endpoint.
    #[arg(long, env = "OP_ROSETTA_RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: Url,
    /// The node's GraphQL endpoint.
    #[arg(
        long,
        env = "OP_ROSETTA_GRAPHQL_URL",
        default_value = "http://localhost:8547/graphql"
    )]
    pub graphql_url: Url,
    /// Backoff between retries of failed RPC requests, in milliseconds.
    #[arg(long, env = "OP_ROSETTA_BACKOFF", default_value_t = 0)]
    pub backoff: u64,
    /// Retries of RPC requests that failed in transport.
    #[arg(long, env = "OP_ROSETTA_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,
}

impl EndpointConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff)
    }
}

/// Everything the client reads, fixed at construction.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Trace fetches that may be in flight at once, across all requests.
    #[arg(long, env = "OP_ROSETTA_TRACE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub trace_capacity: usize,
    /// Timeout handed to the node's tracer.
    #[arg(long, env = "OP_ROSETTA_TRACE_TIMEOUT", default_value = "120s")]
    pub trace_timeout: String,
    /// Fetch a block's traces in batched requests instead of one request per
    /// transaction.
    #[arg(long, env = "OP_ROSETTA_BATCH_TRACES")]
    pub batch_traces: bool,
    /// Don't use the node's `admin_` and sync endpoints when reporting status.
    #[arg(long, env = "OP_ROSETTA_SKIP_ADMIN_CALLS")]
    pub skip_admin_calls: bool,
    #[arg(long, env = "OP_ROSETTA_CURRENCY_SYMBOL", default_value = "ETH")]
    pub currency_symbol: String,
    #[arg(long, env = "OP_ROSETTA_CURRENCY_DECIMALS", default_value_t = 18)]
    pub currency_decimals: u32,
    /// Recipient of the base fee.
    #[arg(long, env = "OP_ROSETTA_BASE_FEE_VAULT", default_value_t = BASE_FEE_VAULT)]
    pub base_fee_vault: Address,
    /// Record the base fee as burned rather than paid to the vault.
    #[arg(long, env = "OP_ROSETTA_BURN_BASE_FEE")]
    pub burn_base_fee: bool,
    /// Recipient of the rollup L1 data fee.
    #[arg(long, env = "OP_ROSETTA_L1_FEE_VAULT", default_value_t = L1_FEE_VAULT)]
    pub l1_fee_vault: Address,
    /// Fixed L1 gas overhead per transaction, before Ecotone.
    #[arg(long, env = "OP_ROSETTA_L1_FEE_OVERHEAD", default_value_t = 2100)]
    pub l1_fee_overhead: u64,
    /// L1 fee scalar before Ecotone, when receipts don't report one.
    #[arg(
        long,
        env = "OP_ROSETTA_L1_FEE_SCALAR",
        default_value = "1.0",
        value_parser = parse_fee_scalar
    )]
    pub l1_fee_scalar: u64,
    /// Charge the signature padding in L1 calldata gas, as before Regolith.
    #[arg(long, env = "OP_ROSETTA_PRE_REGOLITH")]
    pub pre_regolith: bool,
    /// Unix time Fjord's L1 fee formula takes over from Ecotone's. Chains
    /// without Fjord can set a time far in the future.
    #[arg(long, env = "OP_ROSETTA_FJORD_TIME", default_value_t = FJORD_TIME)]
    pub fjord_time: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let chain = ChainConfig::default();
        Self {
            trace_capacity: DEFAULT_CAPACITY,
            trace_timeout: "120s".to_string(),
            batch_traces: false,
            skip_admin_calls: false,
            currency_symbol: chain.currency.symbol,
            currency_decimals: chain.currency.decimals,
            base_fee_vault: BASE_FEE_VAULT,
            burn_base_fee: false,
            l1_fee_vault: chain.l1_fee_vault,
            l1_fee_overhead: chain.l1_fee_overhead,
            l1_fee_scalar: chain.l1_fee_scalar,
            pre_regolith: !chain.regolith,
            fjord_time: chain.fjord_time.unwrap_or(FJORD_TIME),
        }
    }
}

impl ClientConfig {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            currency: Currency {
                symbol: self.currency_symbol.clone(),
                decimals: self.currency_decimals,
            },
            base_fee_vault: (!self.burn_base_fee).then_some(self.base_fee_vault),
            l1_fee_vault: self.l1_fee_vault,
            l1_fee_overhead: self.l1_fee_overhead,
            l1_fee_scalar: self.l1_fee_scalar,
            regolith: !self.pre_regolith,
            fjord_time: Some(self.fjord_time),
        }
    }
}

fn parse_fee_scalar(s: &str) -> Result<u64, String> {
    let scalar = fee::parse_fee_scalar(s).map_err(|e| e.to_string())?;
    u64::try_from(scalar).map_err(|_| format!("fee scalar {s} is too large"))
}

/// The outcome of [`load_env_file`], to be logged once logging is up.
#[derive(Debug)]
#[must_use = "call `EnvFile::log` once tracing is initialized"]
pub struct EnvFile(dotenvy::Result<PathBuf>);

/// Load a local `.env` into the environment, if there is one.
///
/// Runs before logging is set up, so `RUST_LOG` may come from the file.
pub fn load_env_file() -> EnvFile {
    EnvFile(dotenvy::dotenv())
}

impl EnvFile {
    /// A missing file is not worth mentioning. An unreadable one is not an
    /// error either.
    pub fn log(self) {
        match self.0 {
            Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
            Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => (),
            Err(dotenvy::Error::Io(e)) => tracing::warn!("couldn't read `.env`: {e}"),
            Err(e) => tracing::warn!("found a local `.env`, but couldn't parse it: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use clap::Parser;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        endpoints: EndpointConfig,
        #[command(flatten)]
        client: ClientConfig,
    }

    #[test]
    fn defaults_match_the_cli() {
        let cli = Cli::parse_from(["op-rosetta"]);
        assert_eq!(cli.client, ClientConfig::default());
        assert_eq!(cli.client.chain_config(), ChainConfig::default());
        assert_eq!(cli.endpoints.backoff(), Duration::ZERO);
    }

    #[test]
    fn burning_and_scalars() {
        let cli = Cli::parse_from([
            "op-rosetta",
            "--burn-base-fee",
            "--l1-fee-scalar",
            "0.684",
            "--trace-capacity",
            "8",
            "--fjord-time",
            "1704992401",
        ]);
        let chain = cli.client.chain_config();
        assert_eq!(chain.base_fee_vault, None);
        assert_eq!(chain.l1_fee_scalar, 684_000);
        assert!(chain.is_fjord_active(1_704_992_401));
        assert!(!chain.is_fjord_active(1_704_992_400));
        assert_eq!(cli.client.trace_capacity, 8);
    }

    #[test]
    fn env_file_problems_are_logged_later() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .with_ansi(false)
            .finish();
        let missing = EnvFile(Err(dotenvy::Error::Io(io::ErrorKind::NotFound.into())));
        let unreadable = EnvFile(Err(dotenvy::Error::Io(
            io::ErrorKind::PermissionDenied.into(),
        )));

        tracing::subscriber::with_default(subscriber, || {
            missing.log();
            unreadable.log();
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("couldn't read `.env`"));
    }
}
