//! Connection to a subtensor node
//!
//! Wraps the subxt client used for storage reads and for submitting extrinsics. Every read goes
//! to the node, nothing is cached between calls.

use crate::address::Ss58Prefix;
use crate::call::ChainCall;
use crate::storage::{final_storage_key, AccountInfo, ProxyRecord, ProxyType, StorageKey};
use crate::submitter::TransactionSubmitter;
use crate::traits::{ChainBackend, FinalizedInclusion, TxEvent, TxEventStream};
use crate::types::*;
use futures::{stream, StreamExt};
use jsonrpsee::core::async_trait;
use parity_scale_codec::Decode;
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::RpcClient;
use subxt::error::DispatchError;
use subxt::metadata::types::StorageEntryType;
use subxt::tx::{TxInBlock, TxStatus};
use subxt::{Metadata, OnlineClient};
use subxt_signer::sr25519::Keypair;

type ChainTxStatus = TxStatus<ChainConfig, OnlineClient<ChainConfig>>;
type ChainTxInBlock = TxInBlock<ChainConfig, OnlineClient<ChainConfig>>;

/// Client of a subtensor node
#[derive(Clone)]
pub struct SubtensorClient {
    /// Represents a chains API
    api: OnlineClient<ChainConfig>,
    /// Represents a connection to RPC
    rpc: LegacyRpcMethods<ChainConfig>,
    /// Network prefix used to render addresses
    ss58_prefix: Ss58Prefix,
}

impl SubtensorClient {
    pub async fn from_url(url: &str, ss58_prefix: Ss58Prefix) -> anyhow::Result<Self> {
        let rpc = RpcClient::from_url(url).await?;
        let api = OnlineClient::<ChainConfig>::from_rpc_client(rpc.clone()).await?;
        let rpc = LegacyRpcMethods::new(rpc);

        log::info!("connected to {}", url);

        Ok(Self {
            api,
            rpc,
            ss58_prefix,
        })
    }

    pub fn api(&self) -> &OnlineClient<ChainConfig> {
        &self.api
    }

    pub fn ss58_prefix(&self) -> Ss58Prefix {
        self.ss58_prefix
    }

    /// Submitter driving extrinsics through this client
    pub fn submitter(&self) -> TransactionSubmitter<Self> {
        TransactionSubmitter::new(self.clone())
    }

    /// Number of the latest finalized block
    pub async fn finalized_block_number(&self) -> Result<u64, BackendError> {
        let hash = self.rpc.chain_get_finalized_head().await?;
        let header = self
            .rpc
            .chain_get_header(Some(hash))
            .await?
            .ok_or_else(|| BackendError::Other(format!("header of {:?} not found", hash)))?;

        Ok(header.number.into())
    }

    /// Read the raw storage value of a pallet at the latest finalized block
    pub async fn read_storage(
        &self,
        pallet_name: &str,
        storage_key: &StorageKey,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let metadata = self.api.metadata();
        let pallet = metadata
            .pallet_by_name(pallet_name)
            .ok_or_else(|| BackendError::Metadata(format!("pallet {}", pallet_name)))?;
        let storage = pallet
            .storage()
            .ok_or_else(|| BackendError::Metadata(format!("storage of {}", pallet_name)))?;
        let entry = storage.entry_by_name(&storage_key.name).ok_or_else(|| {
            BackendError::Metadata(format!("{}::{}", pallet_name, storage_key.name))
        })?;

        let hashers = match entry.entry_type() {
            StorageEntryType::Plain(_) => vec![],
            StorageEntryType::Map { hashers, .. } => {
                if hashers.len() != storage_key.keys.len() {
                    return Err(BackendError::Other(format!(
                        "{}::{} takes {} key(s), got {}",
                        pallet_name,
                        storage_key.name,
                        hashers.len(),
                        storage_key.keys.len()
                    )));
                }
                hashers.clone()
            }
        };

        let final_key = final_storage_key(pallet_name, storage_key, &hashers);

        let value = self
            .api
            .storage()
            .at_latest()
            .await?
            .fetch_raw(final_key)
            .await?;

        Ok(value)
    }

    /// `System::Account`, a missing account reads as the default
    pub async fn account(&self, who: &AccountId32) -> Result<AccountInfo, BackendError> {
        match self
            .read_storage("System", &StorageKey::map("Account", who))
            .await?
        {
            Some(raw) => Ok(AccountInfo::decode(&mut &raw[..])?),
            None => Ok(AccountInfo::default()),
        }
    }

    /// Free balance in rao
    pub async fn free_balance(&self, who: &AccountId32) -> Result<u128, BackendError> {
        Ok(self.account(who).await?.data.free)
    }

    /// Nonce of the account's next extrinsic
    pub async fn nonce(&self, who: &AccountId32) -> Result<u32, BackendError> {
        Ok(self.account(who).await?.nonce)
    }

    /// Proxy relationships of `proxied`
    pub async fn proxies(&self, proxied: &AccountId32) -> Result<ProxyRecord, BackendError> {
        match self
            .read_storage("Proxy", &StorageKey::map("Proxies", proxied))
            .await?
        {
            Some(raw) => Ok(ProxyRecord::decode(&mut &raw[..])?),
            None => Ok(ProxyRecord::default()),
        }
    }

    /// Whether `delegate` may act for `proxied`, looked up the way `Proxy::proxy` does with
    /// `force_proxy_type`
    pub async fn has_proxy(
        &self,
        proxied: &AccountId32,
        delegate: &AccountId32,
        force_proxy_type: Option<ProxyType>,
    ) -> Result<bool, BackendError> {
        Ok(self.proxies(proxied).await?.allows(delegate, force_proxy_type))
    }
}

#[async_trait]
impl ChainBackend for SubtensorClient {
    type Signer = Keypair;

    async fn submit_and_watch(
        &self,
        call: &ChainCall,
        signer: &Keypair,
    ) -> Result<TxEventStream, BackendError> {
        // the nonce is fetched from the node on every submission
        let progress = self
            .api
            .tx()
            .sign_and_submit_then_watch_default(&call.to_payload(), signer)
            .await?;

        let api = self.api.clone();
        let events = progress.flat_map(move |status| match status {
            Ok(status) => tx_events(&api, status),
            Err(e) => stream::iter([Err(BackendError::from(e))]).boxed(),
        });

        Ok(events.boxed())
    }

    async fn finalized_block_number(&self) -> Result<u64, BackendError> {
        SubtensorClient::finalized_block_number(self).await
    }
}

fn tx_events(api: &OnlineClient<ChainConfig>, status: ChainTxStatus) -> TxEventStream {
    let event = match status {
        TxStatus::Validated => TxEvent::Validated,
        TxStatus::Broadcasted { .. } => TxEvent::Broadcast,
        TxStatus::NoLongerInBestBlock => TxEvent::Retracted,
        TxStatus::InBestBlock(tx) => TxEvent::InBlock {
            block_hash: tx.block_hash(),
        },
        TxStatus::InFinalizedBlock(tx) => {
            // finality first, reading the events can still fail
            let finalized = TxEvent::InFinalizedBlock {
                block_hash: tx.block_hash(),
                extrinsic_hash: tx.extrinsic_hash(),
            };
            let api = api.clone();
            let inclusion =
                async move { finalized_inclusion(&api, tx).await.map(TxEvent::Finalized) };
            return stream::iter([Ok(finalized)])
                .chain(stream::once(inclusion))
                .boxed();
        }
        TxStatus::Error { message } => TxEvent::Error(message),
        TxStatus::Invalid { message } => TxEvent::Invalid(message),
        TxStatus::Dropped { message } => TxEvent::Dropped(message),
    };

    stream::iter([Ok(event)]).boxed()
}

/// Read the dispatch results of a finalized extrinsic from its events
async fn finalized_inclusion(
    api: &OnlineClient<ChainConfig>,
    tx: ChainTxInBlock,
) -> Result<FinalizedInclusion, BackendError> {
    let block_hash = tx.block_hash();
    let extrinsic_hash = tx.extrinsic_hash();
    let events = tx.fetch_events().await?;
    let block_number = api.blocks().at(block_hash).await?.number().into();
    let metadata = api.metadata();

    let mut outcome = DispatchOutcome::Success;
    let mut proxy_outcome = None;

    for event in events.iter() {
        let event = event?;
        match (event.pallet_name(), event.variant_name()) {
            ("System", "ExtrinsicFailed") => {
                let error = DispatchError::decode_from(event.field_bytes(), metadata.clone())?;
                outcome = DispatchOutcome::Failed(dispatch_failure(error));
            }
            ("Proxy", "ProxyExecuted") => {
                proxy_outcome = Some(dispatch_result(event.field_bytes(), &metadata)?);
            }
            _ => {}
        }
    }

    Ok(FinalizedInclusion {
        block_hash,
        block_number,
        extrinsic_hash,
        outcome,
        proxy_outcome,
    })
}

/// Decode an encoded `DispatchResult`
fn dispatch_result(bytes: &[u8], metadata: &Metadata) -> Result<DispatchOutcome, BackendError> {
    match dispatch_error_bytes(bytes)? {
        None => Ok(DispatchOutcome::Success),
        Some(error) => {
            let error = DispatchError::decode_from(error, metadata.clone())?;
            Ok(DispatchOutcome::Failed(dispatch_failure(error)))
        }
    }
}

/// The encoded `DispatchError` of a failed `DispatchResult`, `None` on success
fn dispatch_error_bytes(bytes: &[u8]) -> Result<Option<&[u8]>, BackendError> {
    match bytes.split_first() {
        Some((0, [])) => Ok(None),
        Some((1, error)) if !error.is_empty() => Ok(Some(error)),
        _ => Err(BackendError::Decode(format!(
            "invalid DispatchResult: 0x{}",
            hex::encode(bytes)
        ))),
    }
}

fn dispatch_failure(error: DispatchError) -> DispatchFailure {
    match error {
        DispatchError::Module(module) => match module.details() {
            Ok(details) => DispatchFailure::Module {
                pallet: details.pallet.name().to_string(),
                error: details.variant.name.clone(),
                pallet_index: details.pallet.index(),
                error_index: details.variant.index,
            },
            Err(e) => DispatchFailure::Other(format!("unknown module error: {}", e)),
        },
        DispatchError::BadOrigin => DispatchFailure::BadOrigin,
        DispatchError::Token(e) => DispatchFailure::Token(format!("{:?}", e)),
        DispatchError::Arithmetic(e) => DispatchFailure::Arithmetic(format!("{:?}", e)),
        other => DispatchFailure::Other(format!("{:?}", other)),
    }
}
