use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use prism_ops::DispatcherDriver;
use prism_types::Address;

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long, value_name = "ADDR")]
    #[arg(help = "The dispatcher contract.")]
    pub dispatcher: Address,

    #[arg(long)]
    #[arg(help = "Target network.")]
    pub network: String,
}

impl StatusArgs {
    pub async fn run(self) -> Result<ExitCode> {
        let chain = super::chain_client(&self.network, false)?;
        let driver = DispatcherDriver::new(chain);

        let (active_root, active_epoch) = driver.read_active(self.dispatcher).await?;
        let pending = driver.read_pending(self.dispatcher).await?;
        let paused = driver.paused(self.dispatcher).await?;
        let delay = driver.activation_delay(self.dispatcher).await?;

        println!("dispatcher {} on {}", self.dispatcher, self.network);
        println!("  active:  root {active_root} epoch {active_epoch}");
        if pending.is_set() {
            println!(
                "  pending: root {} epoch {} activatable at {}",
                pending.root, pending.epoch, pending.earliest_activation
            );
        } else {
            println!("  pending: none");
        }
        println!("  paused: {paused}, activation delay: {delay}s");
        Ok(ExitCode::SUCCESS)
    }
}
