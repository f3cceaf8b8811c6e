use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use prism_manifest::ArtifactStore;
use prism_ops::smoke::run_smoke;

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(long)]
    #[arg(help = "Target network.")]
    pub network: String,
}

impl VerifyArgs {
    pub async fn run(self, store: Arc<dyn ArtifactStore>) -> Result<ExitCode> {
        let chain = super::chain_client(&self.network, false)?;
        let outcome = run_smoke(&chain, &store, &self.network).await?;

        println!("{} smoke test passed", self.network);
        if let Some(owner) = outcome.factory_owner {
            println!("  factory owner: {owner}");
        }
        if let Some(paused) = outcome.dispatcher_paused {
            println!("  dispatcher paused: {paused}");
        }
        println!("  codehashes verified: {}", outcome.codehashes_verified);
        Ok(ExitCode::SUCCESS)
    }
}
