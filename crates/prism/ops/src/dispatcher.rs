//! Driver for the dispatcher's staged-root protocol.
//!
//! All protocol state lives on chain; the driver queries it fresh on every
//! step and caches nothing except the resolved pending-state ABI shape per
//! dispatcher. Transition ordering (commit happens-before apply
//! happens-before activate) is enforced by the contract and re-asserted
//! here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_sol_types::SolCall;
use prism_manifest::{Manifest, MerkleDocument};
use prism_types::{Address, Hash32, Selector};
use prism_utils::{ChainClient, ChainError, Retryable, TxReceipt, TxRequest};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::abi::IDispatcher;

/// The dispatcher's staged state: a committed-but-not-yet-active root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagedRoot {
    pub root: Hash32,
    pub epoch: u64,
    pub earliest_activation: u64,
}

impl StagedRoot {
    /// `true` when a root is actually staged; an all-zero tuple is the
    /// cleared slot.
    pub fn is_set(&self) -> bool {
        self.root != Hash32::ZERO || self.epoch != 0
    }
}

/// The two pending-state shapes a dispatcher may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingShape {
    /// `pendingRoot()` / `pendingEpoch()` / `earliestActivation()`.
    Getters,
    /// Single `pending() -> (bytes32, uint64, uint64)`.
    Tuple,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("dispatcher {0} exposes neither pending-state ABI shape")]
    AbiMismatch(Address),
    #[error("commit epoch mismatch: expected {expected}, got {got}")]
    EpochMismatch { expected: u64, got: u64 },
    #[error("activation too early: {0} seconds remaining")]
    ActivationTooEarly(u64),
    #[error("no root is staged on dispatcher {0}")]
    NothingPending(Address),
    #[error("route batch arrays have mismatched lengths")]
    BatchShape,
    #[error("staged state on {0} does not reflect the commit")]
    CommitNotObserved(Address),
    #[error("active state on {0} does not reflect the activation")]
    ActivationNotObserved(Address),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl Retryable for DriverError {
    fn is_retryable(&self) -> bool {
        match self {
            DriverError::Chain(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl DriverError {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::AbiMismatch(_) => "AbiMismatch",
            DriverError::EpochMismatch { .. } => "EpochMismatch",
            DriverError::ActivationTooEarly(_) => "ActivationTooEarly",
            DriverError::NothingPending(_) => "NothingPending",
            DriverError::BatchShape => "BatchShape",
            DriverError::CommitNotObserved(_) => "CommitNotObserved",
            DriverError::ActivationNotObserved(_) => "ActivationNotObserved",
            DriverError::Chain(e) => chain_kind(e),
        }
    }
}

pub(crate) fn chain_kind(error: &ChainError) -> &'static str {
    match error {
        ChainError::Transport(_) => "Transport",
        ChainError::Revert(_) => "Revert",
        ChainError::Decode(_) => "Decode",
    }
}

/// Outcome of a `commitRoot`. `replaced` is the staged root this commit
/// displaced, when one was still pending.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    pub receipt: TxReceipt,
    pub staged: StagedRoot,
    pub replaced: Option<StagedRoot>,
}

/// Outcome of an `activateCommittedRoot`.
#[derive(Clone, Debug)]
pub struct ActivationOutcome {
    pub receipt: TxReceipt,
    pub root: Hash32,
    pub epoch: u64,
    /// Chain timestamp once the activation was observable.
    pub activated_at: u64,
}

/// A batch for `applyRoutes`: parallel arrays, sizes pairwise equal.
#[derive(Clone, Debug, Default)]
pub struct RouteBatch {
    pub selectors: Vec<Selector>,
    pub facets: Vec<Address>,
    pub codehashes: Vec<Hash32>,
    pub proofs: Vec<Vec<Hash32>>,
    pub is_right: Vec<Vec<bool>>,
}

impl RouteBatch {
    /// Zips the manifest's routes with the commitment document's proofs.
    pub fn from_manifest(manifest: &Manifest, merkle: &MerkleDocument) -> Self {
        let mut batch = Self::default();
        for (route, proof) in manifest.routes.iter().zip(&merkle.proofs) {
            batch.selectors.push(route.selector);
            batch.facets.push(route.facet);
            batch.codehashes.push(route.codehash);
            batch.proofs.push(proof.iter().map(|step| step.sibling).collect());
            batch.is_right.push(proof.iter().map(|step| step.is_right).collect());
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    fn lengths_match(&self) -> bool {
        self.facets.len() == self.selectors.len()
            && self.codehashes.len() == self.selectors.len()
            && self.proofs.len() == self.selectors.len()
            && self.is_right.len() == self.selectors.len()
            && self
                .proofs
                .iter()
                .zip(&self.is_right)
                .all(|(siblings, bits)| siblings.len() == bits.len())
    }
}

/// Stateless driver over one chain's dispatchers.
pub struct DispatcherDriver {
    chain: Arc<dyn ChainClient>,
    confirmations: u64,
    shapes: Mutex<HashMap<Address, PendingShape>>,
}

impl DispatcherDriver {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain, confirmations: 1, shapes: Mutex::new(HashMap::new()) }
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    async fn static_call<C: SolCall>(
        &self,
        to: Address,
        call: C,
    ) -> Result<C::Return, DriverError> {
        let raw = self.chain.call(to, call.abi_encode().into()).await?;
        C::abi_decode_returns(&raw, true)
            .map_err(|e| DriverError::Chain(ChainError::Decode(e.to_string())))
    }

    /// Resolves which pending-state shape the dispatcher exposes. Probes by
    /// static-call-with-decode: the individual getter first, the tuple on a
    /// revert or decode failure. The answer is remembered for the rest of
    /// the run.
    async fn pending_shape(&self, dispatcher: Address) -> Result<PendingShape, DriverError> {
        if let Some(shape) = self.shapes.lock().expect("shape cache poisoned").get(&dispatcher) {
            return Ok(*shape);
        }

        let shape = match self.static_call(dispatcher, IDispatcher::pendingRootCall {}).await {
            Ok(_) => PendingShape::Getters,
            Err(DriverError::Chain(ChainError::Transport(e))) => {
                return Err(ChainError::Transport(e).into());
            }
            Err(_) => match self.static_call(dispatcher, IDispatcher::pendingCall {}).await {
                Ok(_) => PendingShape::Tuple,
                Err(DriverError::Chain(ChainError::Transport(e))) => {
                    return Err(ChainError::Transport(e).into());
                }
                Err(_) => return Err(DriverError::AbiMismatch(dispatcher)),
            },
        };

        debug!(%dispatcher, ?shape, "Resolved pending-state ABI shape.");
        self.shapes.lock().expect("shape cache poisoned").insert(dispatcher, shape);
        Ok(shape)
    }

    /// Reads the staged root, probing the ABI shape on first contact.
    pub async fn read_pending(&self, dispatcher: Address) -> Result<StagedRoot, DriverError> {
        match self.pending_shape(dispatcher).await? {
            PendingShape::Getters => {
                let root =
                    self.static_call(dispatcher, IDispatcher::pendingRootCall {}).await?._0;
                let epoch =
                    self.static_call(dispatcher, IDispatcher::pendingEpochCall {}).await?._0;
                let earliest_activation = self
                    .static_call(dispatcher, IDispatcher::earliestActivationCall {})
                    .await?
                    ._0;
                Ok(StagedRoot { root, epoch, earliest_activation })
            }
            PendingShape::Tuple => {
                let ret = self.static_call(dispatcher, IDispatcher::pendingCall {}).await?;
                Ok(StagedRoot {
                    root: ret.root,
                    epoch: ret.epoch,
                    earliest_activation: ret.earliestActivation,
                })
            }
        }
    }

    pub async fn read_active(&self, dispatcher: Address) -> Result<(Hash32, u64), DriverError> {
        let root = self.static_call(dispatcher, IDispatcher::activeRootCall {}).await?._0;
        let epoch = self.static_call(dispatcher, IDispatcher::activeEpochCall {}).await?._0;
        Ok((root, epoch))
    }

    pub async fn activation_delay(&self, dispatcher: Address) -> Result<u64, DriverError> {
        Ok(self.static_call(dispatcher, IDispatcher::activationDelayCall {}).await?._0)
    }

    pub async fn paused(&self, dispatcher: Address) -> Result<bool, DriverError> {
        Ok(self.static_call(dispatcher, IDispatcher::pausedCall {}).await?._0)
    }

    /// Commits `root` under `epoch`. Pre-checks epoch monotonicity against
    /// the live active epoch; a still-pending root is replaced and the
    /// replacement surfaced in the outcome, never silently.
    pub async fn commit_root(
        &self,
        dispatcher: Address,
        root: Hash32,
        epoch: u64,
    ) -> Result<CommitOutcome, DriverError> {
        let (_, active_epoch) = self.read_active(dispatcher).await?;
        if epoch != active_epoch + 1 {
            return Err(DriverError::EpochMismatch { expected: active_epoch + 1, got: epoch });
        }

        let prior = self.read_pending(dispatcher).await?;
        let replaced = prior.is_set().then_some(prior);
        if let Some(prior) = &replaced {
            warn!(
                %dispatcher,
                replaced_root = %prior.root,
                replaced_epoch = prior.epoch,
                "Commit replaces a still-pending root."
            );
        }

        let data = IDispatcher::commitRootCall { root, epoch }.abi_encode();
        let receipt = self
            .chain
            .send_and_wait(TxRequest::call(dispatcher, data.into()), self.confirmations)
            .await?;

        let staged = self.read_pending(dispatcher).await?;
        if staged.root != root || staged.epoch != epoch {
            return Err(DriverError::CommitNotObserved(dispatcher));
        }

        trace!(%dispatcher, %root, epoch, earliest = staged.earliest_activation, "Root committed.");
        Ok(CommitOutcome { receipt, staged, replaced })
    }

    /// Applies a route batch against the pending root.
    pub async fn apply_routes(
        &self,
        dispatcher: Address,
        batch: &RouteBatch,
    ) -> Result<TxReceipt, DriverError> {
        if !batch.lengths_match() {
            return Err(DriverError::BatchShape);
        }

        let data = IDispatcher::applyRoutesCall {
            selectors: batch.selectors.clone(),
            facets: batch.facets.clone(),
            codehashes: batch.codehashes.clone(),
            proofs: batch.proofs.clone(),
            isRight: batch.is_right.clone(),
        }
        .abi_encode();

        let receipt = self
            .chain
            .send_and_wait(TxRequest::call(dispatcher, data.into()), self.confirmations)
            .await?;

        trace!(%dispatcher, routes = batch.len(), "Routes applied.");
        Ok(receipt)
    }

    /// Activates the pending root once the activation delay has elapsed.
    /// Post-condition: the prior pending root is active and the staged slot
    /// is cleared.
    pub async fn activate_committed_root(
        &self,
        dispatcher: Address,
    ) -> Result<ActivationOutcome, DriverError> {
        let pending = self.read_pending(dispatcher).await?;
        if !pending.is_set() {
            return Err(DriverError::NothingPending(dispatcher));
        }

        let now = self.chain.block_timestamp().await?;
        if now < pending.earliest_activation {
            return Err(DriverError::ActivationTooEarly(pending.earliest_activation - now));
        }

        let data = IDispatcher::activateCommittedRootCall {}.abi_encode();
        let receipt = self
            .chain
            .send_and_wait(TxRequest::call(dispatcher, data.into()), self.confirmations)
            .await?;

        let (active_root, active_epoch) = self.read_active(dispatcher).await?;
        if active_root != pending.root || active_epoch != pending.epoch {
            return Err(DriverError::ActivationNotObserved(dispatcher));
        }
        let after = self.read_pending(dispatcher).await?;
        if after.is_set() {
            warn!(%dispatcher, "Staged slot not cleared after activation.");
        }

        let activated_at = self.chain.block_timestamp().await?;
        debug!(%dispatcher, root = %active_root, epoch = active_epoch, "Root activated.");
        Ok(ActivationOutcome { receipt, root: active_root, epoch: active_epoch, activated_at })
    }
}
