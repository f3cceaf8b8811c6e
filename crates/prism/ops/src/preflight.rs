//! Invariant checks that run before any cross-chain state change.

use std::collections::BTreeMap;
use std::sync::Arc;

use prism_manifest::{merkle, CompiledArtifact, Manifest, MerkleDocument};
use prism_types::{create2_address, init_code_hash, Address, Hash32, U256, MAX_CONTRACT_SIZE};
use prism_utils::{ChainClient, ChainError};
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::dispatcher::{chain_kind, DispatcherDriver, DriverError};
use crate::report::ErrorRecord;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("predicted factory addresses diverge: {0:?}")]
    AddressParity(BTreeMap<String, Address>),
    #[error("proof for route {index} does not reproduce root {expected_root}")]
    ProofFailed { index: usize, expected_root: Hash32 },
    #[error("commitment document covers {proofs} of {routes} routes")]
    IncompleteCommitment { routes: usize, proofs: usize },
    #[error("deployer balance {balance} is below the {minimum} minimum")]
    InsufficientBalance { balance: U256, minimum: U256 },
    #[error("factory init code is {0} bytes, limit is {MAX_CONTRACT_SIZE}")]
    InitCodeTooLarge(usize),
    #[error("runtime codehash mismatch: artifact {expected}, chain {actual}")]
    CodehashMismatch { expected: Hash32, actual: Hash32 },
    #[error("no code at facet {facet} on {network}")]
    NoCodeAtFacet { facet: Address, network: String },
    #[error("manifest targets epoch {target} but the dispatcher's active epoch is {active}")]
    EpochMismatch { target: u64, active: u64 },
    #[error("commitment document root {doc} disagrees with manifest root {manifest}")]
    RootDisagreement { doc: Hash32, manifest: Hash32 },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl PreflightError {
    pub fn kind(&self) -> &'static str {
        match self {
            PreflightError::AddressParity(_) => "AddressParity",
            PreflightError::ProofFailed { .. } => "ProofFailed",
            PreflightError::IncompleteCommitment { .. } => "ProofFailed",
            PreflightError::InsufficientBalance { .. } => "InsufficientBalance",
            PreflightError::InitCodeTooLarge(_) => "InitCodeTooLarge",
            PreflightError::CodehashMismatch { .. } => "CodehashMismatch",
            PreflightError::NoCodeAtFacet { .. } => "NoCodeAtFacet",
            PreflightError::EpochMismatch { .. } => "EpochMismatch",
            PreflightError::RootDisagreement { .. } => "RootDisagreement",
            PreflightError::Chain(e) => chain_kind(e),
            PreflightError::Driver(e) => e.kind(),
        }
    }

    fn record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self)
    }
}

/// Result of one check category.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<String>,
}

impl CheckOutcome {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), passed: true, errors: vec![], warnings: vec![] }
    }

    fn error(&mut self, error: PreflightError) {
        warn!(check = %self.name, %error, "Preflight check failed.");
        self.passed = false;
        self.errors.push(error.record());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Aggregate of all check categories; passes only when every check passed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    pub checks: Vec<CheckOutcome>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.checks.iter().flat_map(|check| check.errors.iter())
    }
}

/// Runs the invariant checks against every target network.
pub struct Preflight<'a> {
    clients: &'a BTreeMap<String, Arc<dyn ChainClient>>,
    config: &'a RunConfig,
}

impl<'a> Preflight<'a> {
    pub fn new(clients: &'a BTreeMap<String, Arc<dyn ChainClient>>, config: &'a RunConfig) -> Self {
        Self { clients, config }
    }

    /// The pre-deploy subset: connectivity, bytecode bounds and factory
    /// address parity. Returns the single predicted address when parity
    /// holds.
    pub async fn parity_only(
        &self,
        factory: &CompiledArtifact,
    ) -> (Option<Address>, PreflightReport) {
        let mut report = PreflightReport::default();
        report.checks.push(self.check_connectivity().await);
        report.checks.push(self.check_bytecode(factory));

        let (predicted, parity) = self.check_factory_parity(factory).await;
        report.checks.push(parity);
        (predicted, report)
    }

    /// The full set, run after factory deployment and before any dispatcher
    /// state change.
    pub async fn full(
        &self,
        factory: &CompiledArtifact,
        manifest: &Manifest,
        merkle_doc: &MerkleDocument,
        dispatchers: &BTreeMap<String, Address>,
    ) -> (Option<Address>, PreflightReport) {
        let (predicted, mut report) = self.parity_only(factory).await;

        if let Some(predicted) = predicted {
            report.checks.push(self.check_existing_deployment(factory, predicted).await);
        }
        report.checks.push(self.check_facet_liveness(manifest).await);
        report.checks.push(self.check_proofs(manifest, merkle_doc));
        report.checks.push(self.check_epochs(manifest, dispatchers).await);
        (predicted, report)
    }

    /// Every target must answer `chain_id` and hold the minimum deployer
    /// balance.
    async fn check_connectivity(&self) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("connectivity");
        for (network, chain) in self.clients {
            match chain.chain_id().await {
                Ok(id) => debug!(network, chain_id = id, "Network reachable."),
                Err(e) => {
                    outcome.error(e.into());
                    continue;
                }
            }
            match chain.get_balance(chain.deployer_address()).await {
                Ok(balance) if balance < self.config.min_balance => {
                    outcome.error(PreflightError::InsufficientBalance {
                        balance,
                        minimum: self.config.min_balance,
                    });
                }
                Ok(_) => {}
                Err(e) => outcome.error(e.into()),
            }
        }
        outcome
    }

    fn check_bytecode(&self, factory: &CompiledArtifact) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("bytecode");
        if factory.init_code.len() > MAX_CONTRACT_SIZE {
            outcome.error(PreflightError::InitCodeTooLarge(factory.init_code.len()));
        }
        outcome
    }

    /// Predicts the factory address on every network; all predictions must
    /// collapse to one value. Divergence is fatal for the whole run.
    async fn check_factory_parity(
        &self,
        factory: &CompiledArtifact,
    ) -> (Option<Address>, CheckOutcome) {
        let mut outcome = CheckOutcome::new("factory-parity");
        let code_hash = init_code_hash(&factory.init_code);

        let predictions: BTreeMap<String, Address> = self
            .clients
            .iter()
            .map(|(network, chain)| {
                let predicted =
                    create2_address(chain.create2_deployer(), self.config.frozen_salt, code_hash);
                (network.clone(), predicted)
            })
            .collect();

        let mut distinct = predictions.values().collect::<Vec<_>>();
        distinct.sort();
        distinct.dedup();

        if distinct.len() > 1 {
            outcome.error(PreflightError::AddressParity(predictions));
            return (None, outcome);
        }
        (predictions.values().next().copied(), outcome)
    }

    /// Code already present at the predicted address is a warning, not an
    /// error: the redeploy path is idempotent. A present-but-different
    /// codehash is an error.
    async fn check_existing_deployment(
        &self,
        factory: &CompiledArtifact,
        predicted: Address,
    ) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("existing-deployment");
        for (network, chain) in self.clients {
            match chain.get_codehash(predicted).await {
                Ok(actual) if actual == Hash32::ZERO => {}
                Ok(actual) if actual == factory.runtime_codehash => {
                    outcome.warning(format!(
                        "factory already deployed at {predicted} on {network}"
                    ));
                }
                Ok(actual) => {
                    outcome.error(PreflightError::CodehashMismatch {
                        expected: factory.runtime_codehash,
                        actual,
                    });
                }
                Err(e) => outcome.error(e.into()),
            }
        }
        outcome
    }

    /// Every facet the manifest claims must be live on every target chain:
    /// present, and carrying exactly the declared codehash.
    async fn check_facet_liveness(&self, manifest: &Manifest) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("facet-liveness");
        for (network, chain) in self.clients {
            for (facet, entry) in &manifest.facets {
                match chain.get_codehash(*facet).await {
                    Ok(actual) if actual == Hash32::ZERO => {
                        outcome.error(PreflightError::NoCodeAtFacet {
                            facet: *facet,
                            network: network.clone(),
                        });
                    }
                    Ok(actual) if actual != entry.codehash => {
                        outcome.error(PreflightError::CodehashMismatch {
                            expected: entry.codehash,
                            actual,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => outcome.error(e.into()),
                }
            }
        }
        outcome
    }

    /// Reproduces a random sample of inclusion proofs locally. Any failure
    /// aborts the preflight.
    fn check_proofs(&self, manifest: &Manifest, merkle_doc: &MerkleDocument) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("proof-reproducibility");
        if merkle_doc.root != manifest.merkle_root {
            outcome.error(PreflightError::RootDisagreement {
                doc: merkle_doc.root,
                manifest: manifest.merkle_root,
            });
            return outcome;
        }
        if manifest.routes.is_empty() {
            outcome.warning("manifest is empty; nothing to prove".to_string());
            return outcome;
        }
        if merkle_doc.proofs.len() != manifest.routes.len()
            || merkle_doc.leaves.len() != manifest.routes.len()
        {
            outcome.error(PreflightError::IncompleteCommitment {
                routes: manifest.routes.len(),
                proofs: merkle_doc.proofs.len(),
            });
            return outcome;
        }

        let count = self.config.proof_sample.min(manifest.routes.len());
        let indices = sample(&mut rand::thread_rng(), manifest.routes.len(), count);
        for index in indices {
            let leaf = manifest.routes[index].leaf();
            let proof = &merkle_doc.proofs[index];
            if merkle_doc.leaves[index] != leaf
                || !merkle::verify(leaf, proof, manifest.merkle_root)
            {
                outcome.error(PreflightError::ProofFailed {
                    index,
                    expected_root: manifest.merkle_root,
                });
            }
        }
        outcome
    }

    /// `target_epoch` must equal `active_epoch + 1` on every dispatcher.
    async fn check_epochs(
        &self,
        manifest: &Manifest,
        dispatchers: &BTreeMap<String, Address>,
    ) -> CheckOutcome {
        let mut outcome = CheckOutcome::new("epoch-monotonicity");
        for (network, dispatcher) in dispatchers {
            let Some(chain) = self.clients.get(network) else {
                continue;
            };
            let driver = DispatcherDriver::new(Arc::clone(chain));
            match driver.read_active(*dispatcher).await {
                Ok((_, active)) if manifest.target_epoch != active + 1 => {
                    outcome.error(PreflightError::EpochMismatch {
                        target: manifest.target_epoch,
                        active,
                    });
                }
                Ok(_) => {}
                Err(e) => outcome.error(e.into()),
            }
        }
        outcome
    }
}
