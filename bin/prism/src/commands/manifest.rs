use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use prism_manifest::{
    ArtifactStore, ManifestBuilder, ManifestPolicy, MerkleDocument, MerkleTree, MANIFEST_PATH,
    MERKLE_PATH,
};
use prism_ops::DispatcherDriver;
use prism_types::{codehash, Address};
use tracing::info;

#[derive(Args)]
pub struct ManifestArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    #[arg(help = "Contract names of the deployed facets to route.")]
    pub facets: Vec<String>,

    #[arg(long)]
    #[arg(help = "Network whose facet deployments the manifest is built from.")]
    pub network: String,

    #[arg(long, default_value = "1.0.0")]
    #[arg(help = "Manifest version string.")]
    pub version: String,

    #[arg(long, conflicts_with = "dispatcher")]
    #[arg(help = "Target epoch for the commit.")]
    pub epoch: Option<u64>,

    #[arg(long, value_name = "ADDR")]
    #[arg(help = "Derive the target epoch from this dispatcher's active epoch.")]
    pub dispatcher: Option<Address>,

    #[arg(long)]
    #[arg(help = "Route view and pure functions too.")]
    pub include_views: bool,
}

impl ManifestArgs {
    pub async fn run(self, store: Arc<dyn ArtifactStore>) -> Result<ExitCode> {
        let chain = super::chain_client(&self.network, false)?;

        let target_epoch = match (self.epoch, self.dispatcher) {
            (Some(epoch), _) => epoch,
            (None, Some(dispatcher)) => {
                let driver = DispatcherDriver::new(Arc::clone(&chain));
                let (_, active) = driver.read_active(dispatcher).await?;
                active + 1
            }
            (None, None) => bail!("either --epoch or --dispatcher is required"),
        };

        let mut builder = ManifestBuilder::new(&self.version, target_epoch)
            .with_policy(ManifestPolicy { include_views: self.include_views });

        for name in &self.facets {
            let compiled = store.read_compiled(name)?;
            let deployment = store.read_deployment(&self.network, name)?;
            let code = chain.get_code(deployment.address).await?;
            builder.add_facet(deployment.address, &compiled.abi, codehash(&code), code.len())?;
        }

        let manifest = builder.build()?;
        let tree = MerkleTree::from_leaves(manifest.leaves());
        let document = MerkleDocument::from_tree(&tree);

        store.write_manifest(MANIFEST_PATH, &manifest)?;
        store.write_merkle(MERKLE_PATH, &document)?;

        info!(root = %manifest.merkle_root, routes = manifest.routes.len(), "Manifest written.");
        println!(
            "manifest {} with {} routes over {} facets, root {}",
            manifest.version,
            manifest.routes.len(),
            manifest.facets.len(),
            manifest.merkle_root
        );
        println!("  target epoch: {}", manifest.target_epoch);
        Ok(ExitCode::SUCCESS)
    }
}
