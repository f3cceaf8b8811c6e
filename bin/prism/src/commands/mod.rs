use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use prism_manifest::{ArtifactStore, FsArtifactStore};
use prism_utils::{env, ChainClient, PrivateKeySigner};
use tracing::trace;

use crate::args::PrismArgs;

mod activate;
mod commit;
mod manifest;
mod orchestrate;
mod status;
mod verify;

pub use activate::ActivateArgs;
pub use commit::CommitArgs;
pub use manifest::ManifestArgs;
pub use orchestrate::OrchestrateArgs;
pub use status::StatusArgs;
pub use verify::VerifyArgs;

/// Per-call RPC timeout applied to every chain request.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the full pipeline across the target networks.")]
    Orchestrate(OrchestrateArgs),
    #[command(about = "Build the canonical manifest from deployed facets.")]
    Manifest(ManifestArgs),
    #[command(about = "Commit a manifest root to a dispatcher.")]
    Commit(CommitArgs),
    #[command(about = "Activate the pending root on a dispatcher.")]
    Activate(ActivateArgs),
    #[command(about = "Print a dispatcher's active and staged state.")]
    Status(StatusArgs),
    #[command(about = "Smoke-test a network against its artifacts.")]
    Verify(VerifyArgs),
}

pub async fn run(args: PrismArgs) -> Result<ExitCode> {
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&args.base_dir));
    trace!(base_dir = %args.base_dir.display(), "Opened artifact store.");

    match args.command {
        Commands::Orchestrate(cmd) => cmd.run(store).await,
        Commands::Manifest(cmd) => cmd.run(store).await,
        Commands::Commit(cmd) => cmd.run(store).await,
        Commands::Activate(cmd) => cmd.run().await,
        Commands::Status(cmd) => cmd.run().await,
        Commands::Verify(cmd) => cmd.run(store).await,
    }
}

/// Connects a chain client for `network` from `RPC_URL_<NETWORK>`.
///
/// Commands that only read pass `need_key = false` and get a throwaway
/// signer; anything that sends requires `DEPLOYER_KEY`.
pub fn chain_client(network: &str, need_key: bool) -> Result<Arc<dyn ChainClient>> {
    let url = env::rpc_url(network)?;
    let signer = if need_key { env::deployer_key()? } else { PrivateKeySigner::random() };
    Ok(Arc::new(prism_utils::connect(url, signer, RPC_TIMEOUT)))
}
