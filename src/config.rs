//! Connection settings and retry policy, from the command line or the environment

use crate::address::{Ss58Prefix, DEFAULT_SS58_PREFIX};
use crate::submitter::RetryPolicy;
use std::time::Duration;

/// Local dev node
pub const DEFAULT_URL: &str = "ws://127.0.0.1:9944";
pub const DEFAULT_ETH_URL: &str = "http://127.0.0.1:9944";
/// Chain id of a local subtensor node
pub const DEFAULT_EVM_CHAIN_ID: u64 = 42;

/// Where the chain is and how it renders addresses
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    /// Substrate RPC endpoint
    #[clap(long, env = "SUBTENSOR_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Ethereum RPC endpoint
    #[clap(long, env = "SUBTENSOR_ETH_URL", default_value = DEFAULT_ETH_URL)]
    pub eth_url: String,

    /// Network prefix of SS58 addresses
    #[clap(
        long,
        env = "SUBTENSOR_SS58_PREFIX",
        default_value_t = DEFAULT_SS58_PREFIX,
        value_parser = parse_ss58_prefix
    )]
    pub ss58_prefix: Ss58Prefix,

    /// Chain id the EVM endpoint must report
    #[clap(long, env = "SUBTENSOR_EVM_CHAIN_ID", default_value_t = DEFAULT_EVM_CHAIN_ID)]
    pub evm_chain_id: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            eth_url: DEFAULT_ETH_URL.to_string(),
            ss58_prefix: DEFAULT_SS58_PREFIX,
            evm_chain_id: DEFAULT_EVM_CHAIN_ID,
        }
    }
}

fn parse_ss58_prefix(value: &str) -> Result<Ss58Prefix, String> {
    let prefix = value.parse::<u16>().map_err(|e| e.to_string())?;
    Ss58Prefix::new(prefix).map_err(|e| e.to_string())
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct RetryArgs {
    /// Attempts per submission, including the first
    #[clap(long, env = "SUBTENSOR_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// Seconds an attempt may take to reach finality
    #[clap(long, env = "SUBTENSOR_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Milliseconds to wait between attempts
    #[clap(long, env = "SUBTENSOR_BACKOFF_MS", default_value_t = 1000)]
    pub backoff_ms: u64,
}

impl From<&RetryArgs> for RetryPolicy {
    fn from(args: &RetryArgs) -> Self {
        RetryPolicy {
            max_attempts: args.max_attempts,
            per_attempt_timeout: Duration::from_secs(args.timeout_secs),
            backoff: Duration::from_millis(args.backoff_ms),
        }
    }
}
