use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use prism_manifest::ArtifactStore;
use prism_ops::{Orchestrator, RunConfig, RunStatus};
use prism_utils::env;
use tracing::info;

#[derive(Args)]
pub struct OrchestrateArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    #[arg(help = "Target networks, comma separated.")]
    pub networks: Vec<String>,

    #[arg(long)]
    #[arg(help = "Store-relative path of the manifest to deploy.")]
    pub manifest: Option<String>,

    #[arg(long)]
    #[arg(help = "Predict and read only; no transaction is sent, no artifact written.")]
    pub dry_run: bool,

    #[arg(long)]
    #[arg(help = "Deploy dispatchers during the run instead of reusing artifacts.")]
    pub deploy_dispatcher: bool,

    #[arg(long)]
    #[arg(help = "Deploy dispatchers in paused mode.")]
    pub paused: bool,

    #[arg(long)]
    #[arg(help = "Allow committing an empty (zero-root) manifest.")]
    pub bootstrap: bool,

    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "Wall-clock budget for the whole run.")]
    pub budget: Option<u64>,
}

impl OrchestrateArgs {
    pub async fn run(self, store: Arc<dyn ArtifactStore>) -> Result<ExitCode> {
        let mut config = RunConfig {
            networks: self.networks.clone(),
            dry_run: self.dry_run,
            deploy_dispatcher: self.deploy_dispatcher,
            paused: self.paused,
            bootstrap: self.bootstrap,
            frozen_salt: env::frozen_salt()?,
            activation_delay_override: env::activation_delay_override()?,
            wall_clock_budget: self.budget.map(Duration::from_secs),
            ..Default::default()
        };
        if let Some(manifest) = self.manifest {
            config.manifest_path = manifest;
        }

        let mut clients = BTreeMap::new();
        for network in &self.networks {
            clients.insert(network.clone(), super::chain_client(network, !self.dry_run)?);
        }

        let orchestrator = Orchestrator::new(clients, store, config);

        // Ctrl-C cancels at the next suspension point; an in-flight
        // transaction may still mine and is reconciled on the next run.
        let cancel = orchestrator.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let report = orchestrator.run().await;

        info!(status = %report.status, "Run finished.");
        println!("status: {}", report.status);
        for outcome in &report.networks {
            println!(
                "  {}: {} ({} errors, {} warnings)",
                outcome.network,
                outcome.status,
                outcome.errors.len(),
                outcome.warnings.len()
            );
            for error in &outcome.errors {
                println!("    {}: {}", error.kind, error.message);
            }
        }
        for error in &report.run_errors {
            println!("  {}: {}", error.kind, error.message);
        }

        Ok(match report.status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::Partial => ExitCode::from(1),
            RunStatus::Abort => ExitCode::from(2),
        })
    }
}
