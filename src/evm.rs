//! Helpers for the EVM side of the chain, over its Ethereum JSON-RPC

use crate::address::h160_from_substrate_key;
use crate::classify::{classify_evm_error, reason_from_message, Verdict};
use crate::submitter::RetryPolicy;
use crate::traits::EthApiClient;
use crate::types::{BackendError, RejectReason, SubmissionError};
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256, U64};
use alloy_rpc_types_eth::{BlockId, BlockNumberOrTag, TransactionInput, TransactionRequest};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use jsonrpsee::core::ClientError as JsonRpcClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Rao have 9 decimals, wei 18
const WEI_PER_RAO: u64 = 1_000_000_000;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Receipt of an EVM transaction, as far as the harness reads it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub gas_used: U256,
    /// `1` on success, `0` on revert
    #[serde(default)]
    pub status: Option<U64>,
}

impl EvmReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::from(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvmError {
    #[error(transparent)]
    Rpc(#[from] BackendError),
    /// The node serves another chain than the configured one
    #[error("expected chain id {expected}, node reports {found:?}")]
    ChainIdMismatch { expected: u64, found: Option<u64> },
    #[error("transaction {transaction_hash} reverted")]
    Reverted {
        transaction_hash: B256,
        receipt: Box<EvmReceipt>,
    },
    #[error("no receipt for {transaction_hash} after {waited:?}")]
    Timeout {
        transaction_hash: B256,
        waited: Duration,
    },
    #[error("failed to sign: {0}")]
    Signing(String),
}

/// A call from an EVM account: a transfer, a contract or a precompile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvmCall {
    pub to: Address,
    /// Wei sent along
    pub value: U256,
    pub input: Bytes,
    /// Estimated by the node when not set
    pub gas_limit: Option<u64>,
}

impl EvmCall {
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            ..Default::default()
        }
    }

    /// Call `to` with ABI encoded `input`
    pub fn contract(to: Address, input: Bytes) -> Self {
        Self {
            to,
            input,
            ..Default::default()
        }
    }

    fn to_request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .from(from)
            .to(self.to)
            .value(self.value)
            .input(TransactionInput::new(self.input.clone()))
    }

    /// EIP-1559 transaction paying at most twice `gas_price` per gas, without a tip
    pub fn to_transaction(
        &self,
        chain_id: u64,
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
    ) -> TxEip1559 {
        TxEip1559 {
            chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: gas_price.saturating_mul(2),
            max_priority_fee_per_gas: 0,
            to: TxKind::Call(self.to),
            value: self.value,
            access_list: Default::default(),
            input: self.input.clone(),
        }
    }
}

/// Sign `tx`, returning its hash and its EIP-2718 encoding
pub fn sign_transaction(
    tx: TxEip1559,
    signer: &PrivateKeySigner,
) -> Result<(B256, Bytes), EvmError> {
    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| EvmError::Signing(e.to_string()))?;
    let signed = tx.into_signed(signature);
    let hash = *signed.hash();

    Ok((hash, TxEnvelope::from(signed).encoded_2718().into()))
}

impl From<JsonRpcClientError> for EvmError {
    fn from(e: JsonRpcClientError) -> Self {
        EvmError::Rpc(e.into())
    }
}

/// Client of the node's Ethereum JSON-RPC
pub struct EvmClient {
    client: HttpClient,
    chain_id: u64,
}

impl EvmClient {
    /// Connect and check that the node serves `expected_chain_id`
    pub async fn connect(url: &str, expected_chain_id: u64) -> Result<Self, EvmError> {
        let client = HttpClientBuilder::default().build(url)?;

        let found = client.chain_id().await?.map(|id| id.to::<u64>());
        if found != Some(expected_chain_id) {
            return Err(EvmError::ChainIdMismatch {
                expected: expected_chain_id,
                found,
            });
        }

        Ok(Self {
            client,
            chain_id: expected_chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Balance of `address` in wei
    pub async fn balance(&self, address: Address) -> Result<U256, EvmError> {
        Ok(self.client.balance(address, Some(latest())).await?)
    }

    /// Balance of the mirror address of a substrate key, in wei
    pub async fn mirror_balance(&self, public_key: [u8; 32]) -> Result<U256, EvmError> {
        self.balance(Address::from(h160_from_substrate_key(public_key)))
            .await
    }

    /// Nonce of the next transaction of `address`, counting the pooled ones
    pub async fn next_nonce(&self, address: Address) -> Result<u64, EvmError> {
        let pending = BlockId::Number(BlockNumberOrTag::Pending);
        Ok(self
            .client
            .transaction_count(address, Some(pending))
            .await?
            .saturating_to::<u64>())
    }

    pub async fn block_number(&self) -> Result<u64, EvmError> {
        Ok(self.client.block_number().await?.saturating_to::<u64>())
    }

    /// `eth_call` at the latest block
    pub async fn call(&self, request: TransactionRequest) -> Result<Bytes, EvmError> {
        Ok(self.client.call(request, Some(latest())).await?)
    }

    /// Submit a signed transaction, returning its hash
    pub async fn send_raw_transaction(&self, bytes: Bytes) -> Result<B256, EvmError> {
        let hash = self.client.send_raw_transaction(bytes).await?;
        log::debug!("sent EVM transaction {}", hash);
        Ok(hash)
    }

    /// Sign `call` with the next nonce of `signer` and submit it, returning the transaction hash
    pub async fn sign_and_send(
        &self,
        call: &EvmCall,
        signer: &PrivateKeySigner,
    ) -> Result<B256, EvmError> {
        let from = signer.address();
        let nonce = self.next_nonce(from).await?;
        let gas_limit = match call.gas_limit {
            Some(gas_limit) => gas_limit,
            None => self
                .client
                .estimate_gas(call.to_request(from), None)
                .await?
                .saturating_to::<u64>(),
        };
        let gas_price = self.client.gas_price().await?.saturating_to::<u128>();

        let tx = call.to_transaction(self.chain_id, nonce, gas_limit, gas_price);
        let (hash, raw) = sign_transaction(tx, signer)?;

        match self.send_raw_transaction(raw).await {
            Ok(_) => Ok(hash),
            // these exact bytes are pooled already
            Err(EvmError::Rpc(BackendError::Rpc { message, .. }))
                if reason_from_message(&message) == RejectReason::AlreadyImported =>
            {
                log::debug!("EVM transaction {} already pooled", hash);
                Ok(hash)
            }
            Err(e) => Err(e),
        }
    }

    /// Sign and submit `call`, then wait for its receipt.
    ///
    /// Rejections by the pool are retried like extrinsics are. Once the pool accepted the
    /// transaction every failure is returned, a revert as [`SubmissionError::Reverted`].
    pub async fn submit_and_wait(
        &self,
        call: &EvmCall,
        signer: &PrivateKeySigner,
        policy: &RetryPolicy,
    ) -> Result<EvmReceipt, SubmissionError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match self.sign_and_send(call, signer).await {
                Ok(hash) => self
                    .wait_for_receipt(hash, RECEIPT_POLL_INTERVAL, policy.per_attempt_timeout)
                    .await
                    .map_err(|e| classify_evm_error(&e).escalate()),
                Err(e) => Err(classify_evm_error(&e)),
            };

            match result {
                Ok(receipt) => return Ok(receipt),
                Err(Verdict::Transient(e)) if attempt < max_attempts => {
                    log::warn!(
                        "EVM call to {} attempt {} failed, retrying in {:?}: {}",
                        call.to,
                        attempt,
                        policy.backoff,
                        e
                    );
                    sleep(policy.backoff).await;
                }
                Err(verdict) => {
                    let e = verdict.into_error();
                    log::warn!(
                        "EVM call to {} failed after {} attempt(s): {}",
                        call.to,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Poll for the receipt of `transaction_hash` until it shows up or `deadline` passes
    pub async fn wait_for_receipt(
        &self,
        transaction_hash: B256,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<EvmReceipt, EvmError> {
        let polled = timeout(deadline, async {
            loop {
                if let Some(receipt) = self.client.transaction_receipt(transaction_hash).await? {
                    return Ok::<_, EvmError>(receipt);
                }
                sleep(poll_interval).await;
            }
        })
        .await;

        let receipt = match polled {
            Ok(receipt) => receipt?,
            Err(_) => {
                return Err(EvmError::Timeout {
                    transaction_hash,
                    waited: deadline,
                })
            }
        };

        if !receipt.succeeded() {
            log::warn!("EVM transaction {} reverted", transaction_hash);
            return Err(EvmError::Reverted {
                transaction_hash,
                receipt: Box::new(receipt),
            });
        }

        log::info!(
            "EVM transaction {} included in block {:?}",
            transaction_hash,
            receipt.block_number
        );
        Ok(receipt)
    }
}

fn latest() -> BlockId {
    BlockId::Number(BlockNumberOrTag::Latest)
}

/// Convert rao to wei
pub fn rao_to_wei(rao: u128) -> U256 {
    U256::from(rao) * U256::from(WEI_PER_RAO)
}

/// Convert wei to rao, dropping the sub-rao remainder
pub fn wei_to_rao(wei: U256) -> u128 {
    (wei / U256::from(WEI_PER_RAO)).saturating_to::<u128>()
}
