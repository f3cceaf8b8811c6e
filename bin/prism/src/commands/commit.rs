use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use prism_manifest::{ArtifactStore, MANIFEST_PATH};
use prism_ops::DispatcherDriver;
use prism_types::Address;

#[derive(Args)]
pub struct CommitArgs {
    #[arg(long, value_name = "ADDR")]
    #[arg(help = "The dispatcher contract.")]
    pub dispatcher: Address,

    #[arg(long, default_value = MANIFEST_PATH)]
    #[arg(help = "Store-relative path of the manifest to commit.")]
    pub manifest: String,

    #[arg(long)]
    #[arg(help = "Target network.")]
    pub network: String,
}

impl CommitArgs {
    pub async fn run(self, store: Arc<dyn ArtifactStore>) -> Result<ExitCode> {
        let manifest = store.read_manifest(&self.manifest)?;
        manifest.validate()?;

        let chain = super::chain_client(&self.network, true)?;
        let driver = DispatcherDriver::new(chain);

        let outcome = driver
            .commit_root(self.dispatcher, manifest.merkle_root, manifest.target_epoch)
            .await?;

        if let Some(replaced) = outcome.replaced {
            println!(
                "replaced still-pending root {} (epoch {})",
                replaced.root, replaced.epoch
            );
        }
        println!(
            "committed root {} under epoch {}, earliest activation at {}",
            outcome.staged.root, outcome.staged.epoch, outcome.staged.earliest_activation
        );
        Ok(ExitCode::SUCCESS)
    }
}
