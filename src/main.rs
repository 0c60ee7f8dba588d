//! # subtensor-tx
//!
//! Command line front of the transaction harness: address conversions, balance and proxy reads,
//! block waits and transfers against a subtensor node.

use clap::Parser;
use subtensor_tx::command::{self, Opts};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    command::run(opts).await
}
