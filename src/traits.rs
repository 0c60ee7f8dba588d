use crate::call::ChainCall;
use crate::types::{BackendError, DispatchOutcome, H256};
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use futures::stream::BoxStream;
use jsonrpsee::{
    core::{async_trait, RpcResult},
    proc_macros::rpc,
};

/// Progress of a submitted extrinsic as reported by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// Validated by the pool
    Validated,
    /// Gossiped to peers
    Broadcast,
    /// Included in a best block
    InBlock { block_hash: H256 },
    /// The best block including it was retracted
    Retracted,
    /// Included in a finalized block. Sent before the block's events are read, so the
    /// submitter knows the extrinsic executed even if reading them fails.
    InFinalizedBlock {
        block_hash: H256,
        extrinsic_hash: H256,
    },
    /// Dispatch results read from the finalized block
    Finalized(FinalizedInclusion),
    /// The pool declared it invalid
    Invalid(String),
    /// The pool dropped it
    Dropped(String),
    /// The node gave up watching it
    Error(String),
}

/// A finalized extrinsic and the result of its dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedInclusion {
    pub block_hash: H256,
    pub block_number: u64,
    pub extrinsic_hash: H256,
    pub outcome: DispatchOutcome,
    /// Result of the inner call when the extrinsic was a `Proxy::proxy`
    pub proxy_outcome: Option<DispatchOutcome>,
}

/// Stream of progress events of one submission
pub type TxEventStream = BoxStream<'static, Result<TxEvent, BackendError>>;

/// Connection to the chain used to submit extrinsics and follow chain progress.
///
/// Implementations must be safe to share between concurrent submissions and must not cache
/// chain state.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Key material that signs extrinsics
    type Signer: Send + Sync;

    /// Sign `call` with a fresh nonce, submit it and watch its progress
    async fn submit_and_watch(
        &self,
        call: &ChainCall,
        signer: &Self::Signer,
    ) -> Result<TxEventStream, BackendError>;

    /// Number of the latest finalized block
    async fn finalized_block_number(&self) -> Result<u64, BackendError>;
}

/// Eth RPC interface, restricted to the methods the harness calls.
///
/// Follows [ETH-RPC](https://ethereum.org/en/developers/docs/apis/json-rpc/)
#[rpc(client)]
pub trait EthApi {
    /// Returns the chain ID used for transaction signing
    #[method(name = "eth_chainId")]
    async fn chain_id(&self) -> RpcResult<Option<U64>>;

    /// Returns highest block number.
    #[method(name = "eth_blockNumber")]
    async fn block_number(&self) -> RpcResult<U256>;

    /// Returns balance of the given account.
    #[method(name = "eth_getBalance")]
    async fn balance(&self, address: Address, block: Option<BlockId>) -> RpcResult<U256>;

    /// Returns the number of transactions sent from given address at given time (block number).
    #[method(name = "eth_getTransactionCount")]
    async fn transaction_count(&self, address: Address, block: Option<BlockId>)
        -> RpcResult<U256>;

    /// Returns current gas_price.
    #[method(name = "eth_gasPrice")]
    async fn gas_price(&self) -> RpcResult<U256>;

    /// Estimate gas needed for execution of given contract.
    #[method(name = "eth_estimateGas")]
    async fn estimate_gas(
        &self,
        request: TransactionRequest,
        block: Option<BlockId>,
    ) -> RpcResult<U256>;

    /// Sends signed transaction, returning its hash.
    #[method(name = "eth_sendRawTransaction")]
    async fn send_raw_transaction(&self, bytes: Bytes) -> RpcResult<B256>;

    /// Returns transaction receipt by transaction hash.
    #[method(name = "eth_getTransactionReceipt")]
    async fn transaction_receipt(&self, hash: B256) -> RpcResult<Option<crate::evm::EvmReceipt>>;

    /// Call contract, returning the output data.
    #[method(name = "eth_call")]
    async fn call(&self, request: TransactionRequest, block: Option<BlockId>) -> RpcResult<Bytes>;
}
