use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use prism_ops::{DispatcherDriver, DriverError};
use prism_types::Address;

#[derive(Args)]
pub struct ActivateArgs {
    #[arg(long, value_name = "ADDR")]
    #[arg(help = "The dispatcher contract.")]
    pub dispatcher: Address,

    #[arg(long)]
    #[arg(help = "Target network.")]
    pub network: String,
}

impl ActivateArgs {
    pub async fn run(self) -> Result<ExitCode> {
        let chain = super::chain_client(&self.network, true)?;
        let driver = DispatcherDriver::new(chain);

        match driver.activate_committed_root(self.dispatcher).await {
            Ok(outcome) => {
                println!(
                    "activated root {} (epoch {}) at {}",
                    outcome.root, outcome.epoch, outcome.activated_at
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(DriverError::ActivationTooEarly(remaining)) => {
                eprintln!("activation too early: {remaining} seconds remaining");
                Ok(ExitCode::from(3))
            }
            Err(err) => Err(err.into()),
        }
    }
}
