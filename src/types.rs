//! Primitive types used in the library.

use alloy_primitives::B256;
use jsonrpsee::core::ClientError as JsonRpcClientError;
use std::time::Duration;
use subxt::{
    config::substrate::{BlakeTwo256, SubstrateHeader},
    config::DefaultExtrinsicParams,
    error::RpcError,
    Config, PolkadotConfig,
};

pub use subxt::utils::{AccountId32, H256};

/// Configuration of the chain
pub enum ChainConfig {}
impl Config for ChainConfig {
    type Hash = H256;
    type AccountId = <PolkadotConfig as Config>::AccountId;
    type Address = <PolkadotConfig as Config>::Address;
    type Signature = <PolkadotConfig as Config>::Signature;
    type Hasher = BlakeTwo256;
    type Header = SubstrateHeader<u32, BlakeTwo256>;
    type AssetId = <PolkadotConfig as Config>::AssetId;
    type ExtrinsicParams = DefaultExtrinsicParams<Self>;
}

/// Errors raised while parsing or decoding an address.
///
/// These are local and never retried; a malformed address is an upstream bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The string is not valid base-58
    #[error("invalid base58 string")]
    InvalidBase58,
    /// The payload has the wrong number of bytes
    #[error("invalid length: {0} bytes")]
    InvalidLength(usize),
    /// The recomputed checksum does not match
    #[error("invalid checksum")]
    InvalidChecksum,
    /// The network prefix is reserved or out of range
    #[error("invalid network prefix {0}")]
    InvalidPrefix(u16),
    /// The address is valid but belongs to another network
    #[error("expected network prefix {expected}, found {found}")]
    PrefixMismatch { expected: u16, found: u16 },
    /// The hex string could not be decoded
    #[error("invalid hex string")]
    InvalidHex,
}

impl From<bs58::decode::Error> for DecodeError {
    fn from(e: bs58::decode::Error) -> Self {
        log::debug!("base58 error: {:?}", e);
        DecodeError::InvalidBase58
    }
}

impl From<hex::FromHexError> for DecodeError {
    fn from(e: hex::FromHexError) -> Self {
        log::debug!("hex error: {:?}", e);
        DecodeError::InvalidHex
    }
}

/// Where a classification of a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Derived from a JSON-RPC error code
    RpcCode,
    /// Derived from matching the error text. Last resort, since node messages are not a stable API.
    MessageText,
}

/// Why the transaction pool refused an extrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Bad signature
    BadProof,
    /// The signer can't pay the fees
    Payment,
    /// The nonce was already used
    Stale,
    /// The nonce is ahead of the account's
    Future,
    /// Would exhaust block limits
    ExhaustsResources,
    /// The pool temporarily banned this transaction
    TemporarilyBanned,
    /// The very same transaction is already in the pool
    AlreadyImported,
    /// A transaction with the same nonce and higher priority is in the pool
    TooLowPriority,
    /// Anything else the pool reported
    Other(String),
}

impl RejectReason {
    /// Rejections caused by a race on the signer's nonce, which go away with a fresh nonce.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RejectReason::Stale
                | RejectReason::Future
                | RejectReason::TemporarilyBanned
                | RejectReason::AlreadyImported
                | RejectReason::TooLowPriority
        )
    }
}

/// A pool rejection along with the information it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    /// JSON-RPC error code, if the node sent one
    pub code: Option<i32>,
    pub classification: Classification,
}

/// A failed dispatch reported by the chain for an included extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// An error declared by a pallet
    Module {
        pallet: String,
        error: String,
        pallet_index: u8,
        error_index: u8,
    },
    /// `TokenError`, e.g. `FundsUnavailable`
    Token(String),
    /// `ArithmeticError`
    Arithmetic(String),
    /// The origin is not allowed to dispatch the call
    BadOrigin,
    /// Any other `DispatchError`
    Other(String),
}

impl DispatchFailure {
    /// Check whether this is the module error `pallet::error`
    pub fn is_module_error(&self, pallet: &str, error: &str) -> bool {
        matches!(self, DispatchFailure::Module { pallet: p, error: e, .. } if p == pallet && e == error)
    }
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchFailure::Module { pallet, error, .. } => write!(f, "{pallet}::{error}"),
            DispatchFailure::Token(e) => write!(f, "Token::{e}"),
            DispatchFailure::Arithmetic(e) => write!(f, "Arithmetic::{e}"),
            DispatchFailure::BadOrigin => write!(f, "BadOrigin"),
            DispatchFailure::Other(e) => write!(f, "{e}"),
        }
    }
}

/// Result of dispatching an included extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failed(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Stages a submission goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Call and signer bound, nothing sent yet
    Built,
    /// Accepted into the transaction pool
    Submitted,
    /// Included in a block that is not final yet
    InBlock,
    /// Included in a finalized block
    Finalized,
    /// Refused by the pool
    Rejected,
    /// Not included before the deadline, or dropped by the pool
    Dropped,
}

/// Outcome taxonomy for chain interactions.
///
/// Callers are expected to match on this: a rejection or module error is often the very thing
/// a scenario asserts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// The transaction pool refused the extrinsic
    #[error("rejected by the pool: {:?}", .0.reason)]
    Rejected(Rejection),
    /// The extrinsic was never included
    #[error("dropped: {reason}")]
    Dropped { reason: String },
    /// The delegate is not a proxy of the proxied account for this call
    #[error("proxy not authorized")]
    ProxyNotAuthorized,
    /// The extrinsic was included but its dispatch failed
    #[error("dispatch failed: {0}")]
    ModuleError(DispatchFailure),
    /// The extrinsic was included but did not reach finality in time
    #[error("timed out after {after:?} in state {stage:?}")]
    Timeout {
        stage: SubmissionState,
        after: Duration,
    },
    /// The EVM transaction was included but its execution reverted
    #[error("EVM transaction {transaction_hash} reverted")]
    Reverted { transaction_hash: B256 },
}

/// Failure to reach a block height before the deadline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("block #{target} not reached after {waited:?} (last seen: {last_seen:?})")]
pub struct TimeoutError {
    pub target: u64,
    pub last_seen: Option<u64>,
    pub waited: Duration,
}

/// Errors raised by the chain connection itself
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The node answered with a JSON-RPC error
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<String>,
    },
    /// The connection to the node was lost
    #[error("disconnected: {0}")]
    Disconnected(String),
    /// A value read from the chain could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
    /// Metadata lookup failed
    #[error("not found in metadata: {0}")]
    Metadata(String),
    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<subxt::Error> for BackendError {
    fn from(e: subxt::Error) -> Self {
        log::error!("subxt error: {:?}", e);
        match e {
            subxt::Error::Rpc(RpcError::ClientError(inner)) => {
                match inner.downcast_ref::<JsonRpcClientError>() {
                    Some(client_error) => BackendError::from_jsonrpsee(client_error),
                    None => BackendError::Other(inner.to_string()),
                }
            }
            subxt::Error::Rpc(RpcError::DisconnectedWillReconnect(msg)) => {
                BackendError::Disconnected(msg)
            }
            subxt::Error::Rpc(RpcError::SubscriptionDropped) => {
                BackendError::Disconnected("subscription dropped".to_string())
            }
            subxt::Error::Codec(e) => BackendError::Decode(e.to_string()),
            subxt::Error::Metadata(e) => BackendError::Metadata(e.to_string()),
            other => BackendError::Other(other.to_string()),
        }
    }
}

impl BackendError {
    fn from_jsonrpsee(e: &JsonRpcClientError) -> Self {
        match e {
            JsonRpcClientError::Call(obj) => BackendError::Rpc {
                code: obj.code(),
                message: obj.message().to_string(),
                data: obj.data().map(|raw| {
                    // pool errors carry a JSON string, anything else is kept verbatim
                    serde_json::from_str::<String>(raw.get()).unwrap_or_else(|_| raw.get().to_string())
                }),
            },
            JsonRpcClientError::RestartNeeded(reason) => {
                BackendError::Disconnected(reason.to_string())
            }
            JsonRpcClientError::Transport(reason) => BackendError::Disconnected(reason.to_string()),
            other => BackendError::Other(other.to_string()),
        }
    }
}

impl From<parity_scale_codec::Error> for BackendError {
    fn from(e: parity_scale_codec::Error) -> Self {
        log::error!("codec error: {:?}", e);
        BackendError::Decode(e.to_string())
    }
}

impl From<JsonRpcClientError> for BackendError {
    fn from(e: JsonRpcClientError) -> Self {
        log::error!("jsonrpsee error: {:?}", e);
        BackendError::from_jsonrpsee(&e)
    }
}
