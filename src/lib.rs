//! # Subtensor transaction harness
//!
//! Library for driving a subtensor node from tests and scripts.
//!
//! - [`address`]: SS58 encoding and the mappings between substrate keys and EVM addresses.
//! - [`submitter`]: submission of extrinsics until finality, with retries of transient failures
//!   and a typed failure taxonomy.
//! - [`client`]: storage reads and the subxt based [`traits::ChainBackend`].
//! - [`evm`]: the node's Ethereum JSON-RPC, and signed EVM calls submitted with the same retry
//!   policy and failure taxonomy.

pub mod address;
pub mod call;
pub mod classify;
pub mod client;
pub mod command;
pub mod config;
pub mod evm;
pub mod storage;
pub mod submitter;
pub mod traits;
pub mod types;


pub use client::SubtensorClient;
pub use evm::{EvmCall, EvmClient};
pub use submitter::{FinalizedReceipt, RetryPolicy, TransactionSubmitter};
pub use types::{DecodeError, SubmissionError, TimeoutError};
