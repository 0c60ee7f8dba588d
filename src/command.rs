//! Command line interface of the transaction harness.

use crate::address::{
    h160_from_substrate_key, parse_account, parse_h160, ss58_encode, to_viem_style_hex,
};
use crate::call;
use crate::client::SubtensorClient;
use crate::config::{ChainSettings, RetryArgs};
use crate::evm::{rao_to_wei, wei_to_rao, EvmCall, EvmClient};
use crate::submitter::RetryPolicy;
use crate::types::AccountId32;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;
use std::time::Duration;
use subxt_signer::{sr25519::Keypair, SecretUri};

#[derive(clap::Parser, Debug)]
#[clap(version = "0.1", author = "Subtensor")]
pub struct Opts {
    #[clap(flatten)]
    pub chain: ChainSettings,

    #[clap(flatten)]
    pub retry: RetryArgs,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the encodings of an account
    Address {
        /// SS58 address, 32-byte public key or 20-byte EVM address
        account: String,
    },
    /// Print the free balance and nonce of an account
    Balance { account: String },
    /// Print the proxies of an account
    Proxies { account: String },
    /// Print the EVM balance of an account's mirror address
    MirrorBalance { account: String },
    /// Wait for the chain to finalize a block
    WaitBlock {
        height: u64,
        #[clap(long, default_value_t = 1000)]
        poll_ms: u64,
        #[clap(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Transfer rao and wait for finality
    Transfer {
        /// Secret URI of the signer, e.g. `//Alice`
        #[clap(long, env = "SUBTENSOR_SURI")]
        suri: String,
        #[clap(long)]
        dest: String,
        /// Amount in rao
        #[clap(long)]
        amount: u128,
        /// Transfer from this account instead, with the signer as its proxy
        #[clap(long)]
        proxied: Option<String>,
    },
    /// Transfer from an EVM wallet and wait for the receipt
    EvmTransfer {
        /// Hex private key of the wallet
        #[clap(long, env = "SUBTENSOR_EVM_KEY")]
        private_key: String,
        /// 20-byte hex address
        #[clap(long)]
        to: String,
        /// Amount in rao, sent as wei
        #[clap(long)]
        amount: u128,
    },
}

fn keypair(suri: &str) -> anyhow::Result<Keypair> {
    let uri = SecretUri::from_str(suri)?;
    Ok(Keypair::from_uri(&uri)?)
}

pub async fn run(opts: Opts) -> anyhow::Result<()> {
    let prefix = opts.chain.ss58_prefix;
    let policy = RetryPolicy::from(&opts.retry);

    match opts.command {
        Command::Address { account } => {
            let account = parse_account(&account, prefix)?;
            println!("ss58:       {}", ss58_encode(account.0, prefix));
            println!("public key: {}", to_viem_style_hex(&account.0)?);
            println!(
                "mirror:     {}",
                to_viem_style_hex(&h160_from_substrate_key(account.0))?
            );
        }
        Command::Balance { account } => {
            let account = parse_account(&account, prefix)?;
            let client = SubtensorClient::from_url(&opts.chain.url, prefix).await?;
            let info = client.account(&account).await?;
            println!("free:  {}", info.data.free);
            println!("nonce: {}", info.nonce);
        }
        Command::Proxies { account } => {
            let account = parse_account(&account, prefix)?;
            let client = SubtensorClient::from_url(&opts.chain.url, prefix).await?;
            for proxy in client.proxies(&account).await?.proxies {
                println!(
                    "{} {:?} delay {}",
                    ss58_encode(proxy.delegate.0, prefix),
                    proxy.proxy_type,
                    proxy.delay
                );
            }
        }
        Command::MirrorBalance { account } => {
            let account = parse_account(&account, prefix)?;
            let evm = EvmClient::connect(&opts.chain.eth_url, opts.chain.evm_chain_id).await?;
            let wei = evm.mirror_balance(account.0).await?;
            println!("{} wei ({} rao)", wei, wei_to_rao(wei));
        }
        Command::WaitBlock {
            height,
            poll_ms,
            timeout_secs,
        } => {
            let client = SubtensorClient::from_url(&opts.chain.url, prefix).await?;
            client
                .submitter()
                .wait_for_block_height(
                    height,
                    Duration::from_millis(poll_ms),
                    Duration::from_secs(timeout_secs),
                )
                .await?;
            println!("block #{} finalized", height);
        }
        Command::Transfer {
            suri,
            dest,
            amount,
            proxied,
        } => {
            let signer = keypair(&suri)?;
            let dest = parse_account(&dest, prefix)?;
            let client = SubtensorClient::from_url(&opts.chain.url, prefix).await?;
            let submitter = client.submitter();
            let transfer = call::transfer_keep_alive(&dest, amount);

            let receipt = match proxied {
                Some(proxied) => {
                    let proxied = parse_account(&proxied, prefix)?;
                    submitter
                        .submit_via_proxy(&transfer, &proxied, None, &signer, &policy)
                        .await?
                }
                None => submitter
                    .submit_and_wait(&transfer, &signer, &policy)
                    .await?
                    .into_result()?,
            };

            println!(
                "finalized in block #{} {:?}, extrinsic {:?}, {} attempt(s)",
                receipt.block_number, receipt.block_hash, receipt.extrinsic_hash, receipt.attempts
            );
            println!(
                "signer balance: {}",
                client
                    .free_balance(&AccountId32::from(signer.public_key().0))
                    .await?
            );
        }
        Command::EvmTransfer {
            private_key,
            to,
            amount,
        } => {
            let signer: PrivateKeySigner = private_key.parse()?;
            let to = Address::from(parse_h160(&to)?);
            let evm = EvmClient::connect(&opts.chain.eth_url, opts.chain.evm_chain_id).await?;

            let receipt = evm
                .submit_and_wait(&EvmCall::transfer(to, rao_to_wei(amount)), &signer, &policy)
                .await?;

            println!(
                "included in block {:?}, transaction {}",
                receipt.block_number, receipt.transaction_hash
            );
            println!(
                "sender balance: {} wei",
                evm.balance(signer.address()).await?
            );
        }
    }

    Ok(())
}
