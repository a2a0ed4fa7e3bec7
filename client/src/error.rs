use serde::de::DeserializeOwned;
use serde_json::Value;

/// Boxed, so the verbatim upstream error survives in the source chain.
type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node has no such block, or no head yet.
    #[error("not found")]
    NotFound,
    #[error("invalid parameters for {method}: {reason}")]
    ParametersInvalid { method: String, reason: String },
    #[error("unsupported method {0:?}")]
    MethodInvalid(String),
    #[error("invalid account {address}: {reason}")]
    InvalidAccount { address: String, reason: String },
    #[error("invalid block {block}: {reason}")]
    InvalidBlock { block: String, reason: String },
    /// Some receipt or trace of the block couldn't be resolved.
    #[error("block {block} is incomplete: {reason}")]
    AssemblyIncomplete { block: String, reason: String },
    #[error("request canceled")]
    Canceled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("{method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: Source,
    },
    /// The GraphQL endpoint answered with errors unrelated to the queried
    /// block or account.
    #[error("graphql: {0}")]
    GraphQl(String),
    #[error("couldn't decode {what}")]
    Decode {
        what: String,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    #[error(transparent)]
    Flatten(#[from] trace_flattener::DecodeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn transport(method: &'static str, source: anyhow::Error) -> Self {
        Self::Transport {
            method,
            source: source.into(),
        }
    }

    pub(crate) fn incomplete(block: impl ToString, reason: impl Into<String>) -> Self {
        Self::AssemblyIncomplete {
            block: block.to_string(),
            reason: reason.into(),
        }
    }

    /// Caller-initiated abandonment, as opposed to a data or transport
    /// error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

/// Decode raw node JSON, naming the offending field on failure.
pub(crate) fn decode<T: DeserializeOwned>(what: impl Into<String>, value: Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|source| Error::Decode {
        what: what.into(),
        source,
    })
}
