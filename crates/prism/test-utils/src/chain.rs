//! An in-memory [`ChainClient`] with a faithful dispatcher emulation.
//!
//! The mock executes salted creations under the CREATE2 address rule with
//! the deployer account itself as the creator, keeps a clock that advances
//! one second per mined transaction (or manually), and verifies
//! `applyRoutes` proofs against the pending root exactly the way the
//! on-chain verifier does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use prism_manifest::merkle::{verify, ProofStep};
use prism_manifest::Route;
use prism_ops::abi::{IDispatcher, IFactory};
use prism_ops::StagedRoot;
use prism_types::{create2_address, keccak256, Address, Bytes, Hash32, Selector, U256};
use prism_utils::{ChainClient, ChainError, TxReceipt, TxRequest};

/// Which pending-state ABI shape the emulated dispatcher answers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatcherShape {
    #[default]
    Both,
    /// Only `pending()`; the individual getters revert like any unknown
    /// selector.
    TupleOnly,
    /// Only the individual getters.
    GettersOnly,
}

/// Emulated dispatcher state.
#[derive(Clone, Debug)]
pub struct MockDispatcher {
    pub active_root: Hash32,
    pub active_epoch: u64,
    pub pending: Option<StagedRoot>,
    pub delay: u64,
    pub paused: bool,
    pub shape: DispatcherShape,
    /// Routes accepted by `applyRoutes`, in application order.
    pub applied: Vec<(Selector, Address, Hash32)>,
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self {
            active_root: Hash32::ZERO,
            active_epoch: 0,
            pending: None,
            delay: 0,
            paused: false,
            shape: DispatcherShape::default(),
            applied: vec![],
        }
    }
}

impl MockDispatcher {
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_shape(mut self, shape: DispatcherShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }
}

#[derive(Debug, Default)]
struct ChainState {
    timestamp: u64,
    block_number: u64,
    balances: HashMap<Address, U256>,
    code: HashMap<Address, Bytes>,
    /// init_code_hash → runtime code it deploys.
    runtimes: HashMap<Hash32, Bytes>,
    /// init_code_hash → dispatcher instantiated by that init code.
    dispatcher_inits: HashMap<Hash32, MockDispatcher>,
    dispatchers: HashMap<Address, MockDispatcher>,
    /// init_code_hash → owner of the factory that init code deploys.
    factory_inits: HashMap<Hash32, Address>,
    /// factory address → owner answered by `owner()`.
    owners: HashMap<Address, Address>,
    sent: Vec<TxRequest>,
}

/// In-memory chain. Cloning shares the underlying state.
#[derive(Clone, Debug)]
pub struct MockChain {
    chain_id: u64,
    deployer: Address,
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(chain_id: u64, deployer: Address) -> Self {
        let mut state = ChainState { timestamp: 1_000, ..Default::default() };
        // The deployer starts funded; tests lower it to exercise the
        // balance preflight.
        state.balances.insert(deployer, U256::from(10u64).pow(U256::from(18u64)));
        Self { chain_id, deployer, state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain state poisoned")
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock().balances.insert(address, balance);
    }

    pub fn advance_time(&self, seconds: u64) {
        self.lock().timestamp += seconds;
    }

    pub fn now(&self) -> u64 {
        self.lock().timestamp
    }

    pub fn install_code(&self, address: Address, code: Bytes) {
        self.lock().code.insert(address, code);
    }

    /// Registers the runtime code a given init code deploys. Unregistered
    /// init code deploys as itself.
    pub fn register_runtime(&self, init_code: &[u8], runtime: Bytes) {
        self.lock().runtimes.insert(keccak256(init_code), runtime);
    }

    /// Deploying `init_code` instantiates `dispatcher` at the created
    /// address.
    pub fn register_dispatcher_init(&self, init_code: &[u8], dispatcher: MockDispatcher) {
        self.lock().dispatcher_inits.insert(keccak256(init_code), dispatcher);
    }

    /// Deploying `init_code` installs a factory owned by `owner` at the
    /// created address.
    pub fn register_factory_init(&self, init_code: &[u8], owner: Address) {
        self.lock().factory_inits.insert(keccak256(init_code), owner);
    }

    pub fn install_dispatcher(&self, address: Address, dispatcher: MockDispatcher) {
        let mut state = self.lock();
        state.code.insert(address, Bytes::from_static(&[0xfe]));
        state.dispatchers.insert(address, dispatcher);
    }

    pub fn install_factory(&self, address: Address, owner: Address, code: Bytes) {
        let mut state = self.lock();
        state.code.insert(address, code);
        state.owners.insert(address, owner);
    }

    /// Snapshot of an emulated dispatcher, for assertions.
    pub fn dispatcher(&self, address: Address) -> Option<MockDispatcher> {
        self.lock().dispatchers.get(&address).cloned()
    }

    /// How many transactions were sent through this chain.
    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }
}

fn revert(reason: &'static [u8]) -> ChainError {
    ChainError::Revert(Bytes::from_static(reason))
}

fn view_call(dispatcher: &MockDispatcher, data: &[u8]) -> Result<Bytes, ChainError> {
    if data.len() < 4 {
        return Err(revert(b""));
    }
    let selector: [u8; 4] = data[..4].try_into().expect("length checked");
    let pending = dispatcher.pending.unwrap_or_default();
    let tuple = dispatcher.shape != DispatcherShape::GettersOnly;
    let getters = dispatcher.shape != DispatcherShape::TupleOnly;

    let encoded = match selector {
        s if s == IDispatcher::activeRootCall::SELECTOR => {
            IDispatcher::activeRootCall::abi_encode_returns(&(dispatcher.active_root,))
        }
        s if s == IDispatcher::activeEpochCall::SELECTOR => {
            IDispatcher::activeEpochCall::abi_encode_returns(&(dispatcher.active_epoch,))
        }
        s if s == IDispatcher::pendingRootCall::SELECTOR && getters => {
            IDispatcher::pendingRootCall::abi_encode_returns(&(pending.root,))
        }
        s if s == IDispatcher::pendingEpochCall::SELECTOR && getters => {
            IDispatcher::pendingEpochCall::abi_encode_returns(&(pending.epoch,))
        }
        s if s == IDispatcher::earliestActivationCall::SELECTOR && getters => {
            IDispatcher::earliestActivationCall::abi_encode_returns(&(
                pending.earliest_activation,
            ))
        }
        s if s == IDispatcher::pendingCall::SELECTOR && tuple => {
            IDispatcher::pendingCall::abi_encode_returns(&(
                pending.root,
                pending.epoch,
                pending.earliest_activation,
            ))
        }
        s if s == IDispatcher::activationDelayCall::SELECTOR => {
            IDispatcher::activationDelayCall::abi_encode_returns(&(dispatcher.delay,))
        }
        s if s == IDispatcher::pausedCall::SELECTOR => {
            IDispatcher::pausedCall::abi_encode_returns(&(dispatcher.paused,))
        }
        // Unknown selector: revert, like a dispatcher without a fallback.
        _ => return Err(revert(b"")),
    };
    Ok(encoded.into())
}

fn execute_dispatcher(state: &mut ChainState, to: Address, data: &[u8]) -> Result<(), ChainError> {
    let timestamp = state.timestamp;
    let dispatcher = state.dispatchers.get_mut(&to).expect("dispatcher installed");
    if data.len() < 4 {
        return Err(revert(b""));
    }
    let selector: [u8; 4] = data[..4].try_into().expect("length checked");

    if selector == IDispatcher::commitRootCall::SELECTOR {
        let call = IDispatcher::commitRootCall::abi_decode(data, true)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        if call.epoch != dispatcher.active_epoch + 1 {
            return Err(revert(b"DISPATCHER_BAD_EPOCH"));
        }
        dispatcher.pending = Some(StagedRoot {
            root: call.root,
            epoch: call.epoch,
            earliest_activation: timestamp + dispatcher.delay,
        });
        return Ok(());
    }

    if selector == IDispatcher::applyRoutesCall::SELECTOR {
        let call = IDispatcher::applyRoutesCall::abi_decode(data, true)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        let Some(pending) = dispatcher.pending else {
            return Err(revert(b"DISPATCHER_NO_PENDING"));
        };
        if call.facets.len() != call.selectors.len()
            || call.codehashes.len() != call.selectors.len()
            || call.proofs.len() != call.selectors.len()
            || call.isRight.len() != call.selectors.len()
        {
            return Err(revert(b"DISPATCHER_BAD_BATCH"));
        }

        // Transaction semantics: verify everything before mutating.
        let mut verified = Vec::with_capacity(call.selectors.len());
        for i in 0..call.selectors.len() {
            let route = Route {
                selector: call.selectors[i],
                facet: call.facets[i],
                codehash: call.codehashes[i],
            };
            let steps: Vec<ProofStep> = call.proofs[i]
                .iter()
                .zip(&call.isRight[i])
                .map(|(sibling, is_right)| ProofStep { sibling: *sibling, is_right: *is_right })
                .collect();
            if !verify(route.leaf(), &steps, pending.root) {
                return Err(revert(b"DISPATCHER_BAD_PROOF"));
            }
            verified.push((route.selector, route.facet, route.codehash));
        }
        dispatcher.applied.extend(verified);
        return Ok(());
    }

    if selector == IDispatcher::activateCommittedRootCall::SELECTOR {
        let Some(pending) = dispatcher.pending else {
            return Err(revert(b"DISPATCHER_NO_PENDING"));
        };
        if timestamp < pending.earliest_activation {
            return Err(revert(b"DISPATCHER_TOO_EARLY"));
        }
        dispatcher.active_root = pending.root;
        dispatcher.active_epoch = pending.epoch;
        dispatcher.pending = None;
        return Ok(());
    }

    Err(revert(b""))
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.lock().code.get(&address).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.lock().balances.get(&address).copied().unwrap_or_default())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        Ok(self.lock().timestamp)
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64, ChainError> {
        Ok(100_000)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn send_and_wait(
        &self,
        tx: TxRequest,
        _confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        let mut state = self.lock();
        state.sent.push(tx.clone());
        state.block_number += 1;
        state.timestamp += 1;

        let mut hash_preimage = state.block_number.to_be_bytes().to_vec();
        hash_preimage.extend_from_slice(&tx.data);
        let receipt = TxReceipt {
            tx_hash: keccak256(hash_preimage),
            block_number: Some(state.block_number),
            contract_address: None,
            gas_used: 21_000,
            success: true,
        };

        match (tx.to, tx.salt) {
            (None, Some(salt)) => {
                let init_hash = keccak256(&tx.data);
                let created = create2_address(self.deployer, salt, init_hash);
                let runtime = state
                    .runtimes
                    .get(&init_hash)
                    .cloned()
                    .unwrap_or_else(|| tx.data.clone());
                state.code.insert(created, runtime);
                if let Some(template) = state.dispatcher_inits.get(&init_hash).cloned() {
                    state.dispatchers.insert(created, template);
                }
                if let Some(owner) = state.factory_inits.get(&init_hash).copied() {
                    state.owners.insert(created, owner);
                }
                Ok(TxReceipt { contract_address: Some(created), ..receipt })
            }
            (Some(to), _) if state.dispatchers.contains_key(&to) => {
                execute_dispatcher(&mut state, to, &tx.data)?;
                Ok(receipt)
            }
            (Some(_), _) => Ok(receipt),
            (None, None) => {
                Err(ChainError::Decode("the mock chain only supports salted creations".into()))
            }
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let state = self.lock();
        if let Some(dispatcher) = state.dispatchers.get(&to) {
            return view_call(dispatcher, &data);
        }
        if let Some(owner) = state.owners.get(&to) {
            if data.len() >= 4 && data[..4] == IFactory::ownerCall::SELECTOR {
                return Ok(IFactory::ownerCall::abi_encode_returns(&(*owner,)).into());
            }
            return Err(revert(b""));
        }
        // A call to an account without code returns empty bytes.
        if !state.code.contains_key(&to) {
            return Ok(Bytes::new());
        }
        Err(revert(b""))
    }

    fn deployer_address(&self) -> Address {
        self.deployer
    }

    /// The mock executes CREATE2 from the deployer account itself.
    fn create2_deployer(&self) -> Address {
        self.deployer
    }
}
