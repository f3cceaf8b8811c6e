//! The cross-chain orchestration pipeline.
//!
//! Stage order: pre-deploy invariants → factory deployment → manifest
//! preflight → dispatcher stage (deploy, commit, apply, wait, activate) →
//! smoke tests → finalization. Within a network the stages are strictly
//! sequential and fail fast; across networks the pipeline fans out and
//! keeps going, collecting per-network outcomes for the report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use prism_manifest::{
    ArtifactStore, CompiledArtifact, CrossChainDeployment, Manifest, ManifestError,
    MerkleDocument, StoreError,
};
use prism_types::{Address, Hash32};
use prism_utils::{with_retries, ChainClient, ChainError, Retryable};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, DISPATCHER_CONTRACT, FACTORY_CONTRACT};
use crate::dispatcher::{chain_kind, ActivationOutcome, DispatcherDriver, DriverError, RouteBatch};
use crate::factory::{deploy_deterministic, dispatcher_init_code, DeployOutcome};
use crate::preflight::Preflight;
use crate::report::{ErrorRecord, NetworkOutcome, NetworkStatus, OrchestrationReport, RunStatus};
use crate::smoke::{run_smoke, SmokeError};

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("factory landed at {actual} instead of predicted {predicted} on {network}")]
    AddressDivergence { network: String, predicted: Address, actual: Address },
    #[error("factory addresses did not collapse to one value: {0:?}")]
    ParityBroken(BTreeMap<String, Address>),
    #[error("no code at {0} after deployment")]
    DeployIncomplete(Address),
    #[error("codehash mismatch: expected {expected}, actual {actual}")]
    CodehashMismatch { expected: Hash32, actual: Hash32 },
    #[error("manifest is empty and bootstrap mode is off")]
    EmptyManifest,
    #[error("preflight failed")]
    PreflightAborted,
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Smoke(#[from] SmokeError),
}

impl Retryable for OrchestrateError {
    fn is_retryable(&self) -> bool {
        match self {
            OrchestrateError::Chain(e) => e.is_retryable(),
            OrchestrateError::Driver(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl OrchestrateError {
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrateError::AddressDivergence { .. } => "AddressParity",
            OrchestrateError::ParityBroken(_) => "AddressParity",
            OrchestrateError::DeployIncomplete(_) => "DeployIncomplete",
            OrchestrateError::CodehashMismatch { .. } => "CodehashMismatch",
            OrchestrateError::EmptyManifest => "EmptyManifest",
            OrchestrateError::PreflightAborted => "PreflightAborted",
            OrchestrateError::Cancelled => "Cancelled",
            OrchestrateError::Chain(e) => chain_kind(e),
            OrchestrateError::Driver(e) => e.kind(),
            OrchestrateError::Store(e) => match e {
                StoreError::NotFound(_) => "NotFound",
                StoreError::Parse { .. } => "ParseError",
                StoreError::Io(_) => "Io",
            },
            OrchestrateError::Manifest(e) => manifest_kind(e),
            OrchestrateError::Smoke(e) => match e {
                SmokeError::CodehashDrift { .. } => "CodehashMismatch",
                SmokeError::Chain(e) => chain_kind(e),
                SmokeError::Driver(e) => e.kind(),
                SmokeError::Store(_) => "NotFound",
            },
        }
    }

    fn record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self)
    }
}

fn manifest_kind(error: &ManifestError) -> &'static str {
    match error {
        ManifestError::DuplicateSelector(_) => "DuplicateSelector",
        ManifestError::DuplicateRoute => "DuplicateRoute",
        ManifestError::NoCodeAtFacet(_) => "NoCodeAtFacet",
        ManifestError::CodehashMismatch { .. } => "CodehashMismatch",
        ManifestError::FacetTooLarge(_) => "FacetTooLarge",
        ManifestError::InvalidAbi(_) => "InvalidABI",
        _ => "ManifestInvalid",
    }
}

/// Everything shared by the per-network tasks, borrowed immutably for the
/// duration of the run.
struct RunContext {
    factory: CompiledArtifact,
    manifest: Manifest,
    merkle: MerkleDocument,
    batch: RouteBatch,
}

/// Drives the full pipeline over the configured networks.
pub struct Orchestrator {
    clients: BTreeMap<String, Arc<dyn ChainClient>>,
    store: Arc<dyn ArtifactStore>,
    config: RunConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// `clients` must carry one entry per configured network.
    pub fn new(
        clients: BTreeMap<String, Arc<dyn ChainClient>>,
        store: Arc<dyn ArtifactStore>,
        config: RunConfig,
    ) -> Self {
        assert!(
            config.networks.iter().all(|network| clients.contains_key(network)),
            "every configured network needs a chain client"
        );
        Self { clients, store, config, cancel: CancellationToken::new() }
    }

    /// The run's cancellation handle. Cancelling stops new work immediately
    /// and in-flight tasks at their next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the pipeline to completion and always produces a report, even
    /// when aborting. The report is also written through the store.
    pub async fn run(&self) -> OrchestrationReport {
        let mut report = OrchestrationReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: self.config.dry_run,
            status: RunStatus::Success,
            manifest_root: None,
            target_epoch: None,
            run_errors: vec![],
            preflight: vec![],
            networks: vec![],
        };

        let watchdog = self.config.wall_clock_budget.map(|budget| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                warn!("Wall-clock budget exceeded, cancelling the run.");
                cancel.cancel();
            })
        });

        if let Err(error) = self.execute(&mut report).await {
            report.status = RunStatus::Abort;
            report.run_errors.push(error.record());
            // Networks the abort never reached still appear in the report.
            if report.networks.is_empty() {
                report.networks = self
                    .config
                    .networks
                    .iter()
                    .map(|network| NetworkOutcome::new(network.clone()))
                    .collect();
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        report.finalize();
        report.finished_at = Utc::now();

        // The report survives even a dry run or an abort; only its write
        // failure is irrecoverable enough to merely log.
        match serde_json::to_value(&report) {
            Ok(value) => {
                if let Err(error) = self.store.write_report(&report.file_name(), &value) {
                    warn!(%error, "Failed to write the orchestration report.");
                }
            }
            Err(error) => warn!(%error, "Failed to serialize the orchestration report."),
        }

        report
    }

    async fn execute(&self, report: &mut OrchestrationReport) -> Result<(), OrchestrateError> {
        let factory = self.store.read_compiled(FACTORY_CONTRACT)?;
        let manifest = self.store.read_manifest(&self.config.manifest_path)?;
        manifest.validate()?;
        let merkle = self.store.read_merkle(&self.config.merkle_path)?;
        if manifest.empty && !self.config.bootstrap {
            return Err(OrchestrateError::EmptyManifest);
        }

        report.manifest_root = Some(manifest.merkle_root);
        report.target_epoch = Some(manifest.target_epoch);

        let preflight = Preflight::new(&self.clients, &self.config);

        // Stage 1: pre-deploy invariants. Parity divergence aborts before
        // any state change on any chain.
        let (_, pre) = preflight.parity_only(&factory).await;
        report.preflight.extend(pre.checks.iter().cloned());
        if !pre.passed() {
            report.run_errors.extend(pre.errors().cloned());
            return Err(OrchestrateError::PreflightAborted);
        }

        let context = RunContext {
            batch: RouteBatch::from_manifest(&manifest, &merkle),
            factory,
            manifest,
            merkle,
        };

        // Stage 2: factory deployment on every network. An address landing
        // off-prediction anywhere aborts the whole run.
        let (mut outcomes, cross, diverged) = self.deploy_factories(&context).await;
        if let Some(divergence) = diverged {
            report.networks = outcomes.into_values().collect();
            return Err(divergence);
        }
        // Deployments were each checked against the prediction; the
        // aggregate must therefore collapse to a single address.
        if !cross.identical() {
            report.networks = outcomes.into_values().collect();
            let addresses =
                cross.networks.iter().map(|(n, a)| (n.clone(), a.address)).collect();
            return Err(OrchestrateError::ParityBroken(addresses));
        }

        // Stage 3: full manifest preflight.
        let dispatchers = self.known_dispatchers();
        let (_, full) = preflight
            .full(&context.factory, &context.manifest, &context.merkle, &dispatchers)
            .await;
        report.preflight.extend(full.checks.iter().cloned());
        if !full.passed() {
            report.run_errors.extend(full.errors().cloned());
            report.networks = outcomes.into_values().collect();
            return Err(OrchestrateError::PreflightAborted);
        }

        // Stages 4–5: dispatcher lifecycle and smoke tests, fanned out.
        let tasks: Vec<_> = self
            .config
            .networks
            .iter()
            .filter_map(|network| {
                let outcome = outcomes.remove(network)?;
                Some(self.run_network(network.clone(), outcome, &context))
            })
            .collect();
        report.networks = join_all(tasks).await;

        Ok(())
    }

    /// Dispatcher addresses already on disk, for the epoch preflight.
    fn known_dispatchers(&self) -> BTreeMap<String, Address> {
        self.config
            .networks
            .iter()
            .filter_map(|network| {
                let artifact = self.store.read_deployment(network, DISPATCHER_CONTRACT).ok()?;
                Some((network.clone(), artifact.address))
            })
            .collect()
    }

    /// Deploys the factory everywhere. Returns the partial per-network
    /// outcomes, the cross-chain aggregate, and, when some chain produced
    /// an address off the shared prediction, the divergence that must
    /// abort the run.
    async fn deploy_factories(
        &self,
        context: &RunContext,
    ) -> (BTreeMap<String, NetworkOutcome>, CrossChainDeployment, Option<OrchestrateError>) {
        let tasks: Vec<_> = self
            .config
            .networks
            .iter()
            .map(|network| async {
                let mut outcome = NetworkOutcome::new(network.clone());
                let mut artifact = None;
                let mut diverged = None;
                match self.deploy_factory_on(network, context).await {
                    Ok(deploy) => {
                        outcome.factory_address = Some(deploy.artifact.address);
                        outcome.warnings.extend(deploy.warnings);
                        if !self.config.dry_run {
                            if let Err(error) = self.store.write_deployment(
                                network,
                                FACTORY_CONTRACT,
                                &deploy.artifact,
                            ) {
                                outcome.status = NetworkStatus::Failed;
                                outcome.errors.push(OrchestrateError::from(error).record());
                            }
                        }
                        artifact = Some(deploy.artifact);
                    }
                    Err(error) => {
                        outcome.status = NetworkStatus::Failed;
                        outcome.errors.push(error.record());
                        if matches!(error, OrchestrateError::AddressDivergence { .. }) {
                            diverged = Some(error);
                        }
                    }
                }
                (network.clone(), outcome, artifact, diverged)
            })
            .collect();

        let mut outcomes = BTreeMap::new();
        let mut cross = CrossChainDeployment::new(FACTORY_CONTRACT);
        let mut first_divergence = None;
        for (network, outcome, artifact, diverged) in join_all(tasks).await {
            outcomes.insert(network, outcome);
            if let Some(artifact) = artifact {
                cross.insert(artifact);
            }
            if first_divergence.is_none() {
                first_divergence = diverged;
            }
        }
        (outcomes, cross, first_divergence)
    }

    async fn deploy_factory_on(
        &self,
        network: &str,
        context: &RunContext,
    ) -> Result<DeployOutcome, OrchestrateError> {
        let chain = &self.clients[network];
        self.guard(with_retries(&self.config.retry, "factory-deploy", || {
            deploy_deterministic(
                chain,
                network,
                &context.factory,
                context.factory.init_code.clone(),
                self.config.frozen_salt,
                self.config.confirmations,
                self.config.dry_run,
            )
        }))
        .await
    }

    /// Stages 4–5 for one network. Failures are recorded on the outcome;
    /// other networks are unaffected.
    async fn run_network(
        &self,
        network: String,
        mut outcome: NetworkOutcome,
        context: &RunContext,
    ) -> NetworkOutcome {
        if outcome.status == NetworkStatus::Failed {
            return outcome;
        }
        match self.try_network(&network, &mut outcome, context).await {
            Ok(()) => outcome.status = NetworkStatus::Success,
            Err(error) => {
                warn!(network, %error, "Network pipeline failed.");
                outcome.status = NetworkStatus::Failed;
                outcome.errors.push(error.record());
            }
        }
        outcome
    }

    async fn try_network(
        &self,
        network: &str,
        outcome: &mut NetworkOutcome,
        context: &RunContext,
    ) -> Result<(), OrchestrateError> {
        let chain = &self.clients[network];
        let dispatcher = self.dispatcher_address(network, outcome).await?;
        outcome.dispatcher_address = Some(dispatcher);

        let driver =
            DispatcherDriver::new(Arc::clone(chain)).with_confirmations(self.config.confirmations);

        if self.config.dry_run {
            // Static reads only; no transaction leaves the process.
            let (_, active_epoch) = self.guard(async {
                driver.read_active(dispatcher).await.map_err(OrchestrateError::from)
            })
            .await?;
            outcome.effective_epoch = Some(active_epoch);
            debug!(network, active_epoch, "Dry run: dispatcher state read.");
            return Ok(());
        }

        // Commit.
        let commit = self
            .guard(with_retries(&self.config.retry, "commit-root", || async {
                driver
                    .commit_root(dispatcher, context.manifest.merkle_root, context.manifest.target_epoch)
                    .await
                    .map_err(OrchestrateError::from)
            }))
            .await?;
        outcome.committed_root = Some(commit.staged.root);
        if let Some(replaced) = commit.replaced {
            outcome.warnings.push(format!(
                "replaced still-pending root {} (epoch {})",
                replaced.root, replaced.epoch
            ));
        }

        // Apply routes against the pending root.
        if !context.batch.is_empty() {
            self.guard(with_retries(&self.config.retry, "apply-routes", || async {
                driver
                    .apply_routes(dispatcher, &context.batch)
                    .await
                    .map_err(OrchestrateError::from)
            }))
            .await?;
        }

        // Wait out the activation delay, then activate.
        self.wait_for_activation(chain, commit.staged.earliest_activation).await?;
        let activation = self.activate(&driver, dispatcher).await?;
        outcome.effective_epoch = Some(activation.epoch);
        outcome.activated_at = Some(activation.activated_at);

        // Smoke tests.
        outcome.smoke = Some(
            self.guard(async {
                run_smoke(chain, &self.store, network).await.map_err(OrchestrateError::from)
            })
            .await?,
        );

        info!(network, epoch = activation.epoch, root = %activation.root, "Network finished.");
        Ok(())
    }

    async fn dispatcher_address(
        &self,
        network: &str,
        outcome: &mut NetworkOutcome,
    ) -> Result<Address, OrchestrateError> {
        if !self.config.deploy_dispatcher {
            return Ok(self.store.read_deployment(network, DISPATCHER_CONTRACT)?.address);
        }

        let chain = &self.clients[network];
        let artifact = self.store.read_compiled(DISPATCHER_CONTRACT)?;
        let init_code = dispatcher_init_code(&artifact, self.config.paused);
        let deploy = self
            .guard(with_retries(&self.config.retry, "dispatcher-deploy", || {
                deploy_deterministic(
                    chain,
                    network,
                    &artifact,
                    init_code.clone(),
                    self.config.frozen_salt,
                    self.config.confirmations,
                    self.config.dry_run,
                )
            }))
            .await?;
        outcome.warnings.extend(deploy.warnings.clone());
        if !self.config.dry_run {
            self.store.write_deployment(network, DISPATCHER_CONTRACT, &deploy.artifact)?;
        }
        Ok(deploy.artifact.address)
    }

    /// Sleeps until the dispatcher's earliest activation time. A scheduled
    /// wakeup with no timeout of its own; only cancellation interrupts it.
    async fn wait_for_activation(
        &self,
        chain: &Arc<dyn ChainClient>,
        earliest_activation: u64,
    ) -> Result<(), OrchestrateError> {
        let now = chain.block_timestamp().await?;
        let wait = match self.config.activation_delay_override {
            Some(delay) => delay,
            None => earliest_activation.saturating_sub(now),
        };
        if wait == 0 {
            return Ok(());
        }
        debug!(wait, "Waiting for the activation delay.");
        self.guard(async {
            tokio::time::sleep(Duration::from_secs(wait)).await;
            Ok(())
        })
        .await
    }

    /// Activates, tolerating a clock still slightly behind the earliest
    /// activation time.
    async fn activate(
        &self,
        driver: &DispatcherDriver,
        dispatcher: Address,
    ) -> Result<ActivationOutcome, OrchestrateError> {
        let mut attempts = 0u32;
        loop {
            match driver.activate_committed_root(dispatcher).await {
                Ok(activation) => return Ok(activation),
                Err(DriverError::ActivationTooEarly(remaining)) if attempts < 3 => {
                    attempts += 1;
                    debug!(remaining, attempts, "Activation still early, waiting.");
                    self.guard(async {
                        tokio::time::sleep(Duration::from_secs(remaining.max(1))).await;
                        Ok(())
                    })
                    .await?;
                }
                Err(DriverError::Chain(e)) if e.is_retryable() && attempts < 3 => {
                    attempts += 1;
                    tokio::time::sleep(self.config.retry.backoff(attempts)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wraps a stage so cancellation takes effect at the next suspension
    /// point.
    async fn guard<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, OrchestrateError>>,
    ) -> Result<T, OrchestrateError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(OrchestrateError::Cancelled),
            result = fut => result,
        }
    }
}
