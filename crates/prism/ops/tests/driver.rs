//! Dispatcher driver scenarios against the in-memory chain.

use std::sync::Arc;

use assert_matches::assert_matches;
use prism_manifest::abi::{AbiEntry, AbiFunction, StateMutability};
use prism_manifest::{Manifest, ManifestBuilder, MerkleDocument, MerkleTree};
use prism_ops::{DispatcherDriver, DriverError, RouteBatch};
use prism_test_utils::{DispatcherShape, MockChain, MockDispatcher};
use prism_types::{keccak256, Address, Hash32};
use prism_utils::ChainError;

const DISPATCHER: Address = Address::repeat_byte(0xd1);
const DEPLOYER: Address = Address::repeat_byte(0xe0);

fn chain_with(dispatcher: MockDispatcher) -> MockChain {
    let chain = MockChain::new(31337, DEPLOYER);
    chain.install_dispatcher(DISPATCHER, dispatcher);
    chain
}

fn driver_on(chain: &MockChain) -> DispatcherDriver {
    DispatcherDriver::new(Arc::new(chain.clone()))
}

fn nonpayable(name: &str) -> AbiEntry {
    AbiEntry::Function(AbiFunction {
        name: name.into(),
        inputs: vec![],
        outputs: vec![],
        state_mutability: StateMutability::Nonpayable,
    })
}

/// A manifest with one synthetic facet per signature, plus its commitment
/// document.
fn sample_manifest(names: &[&str], target_epoch: u64) -> (Manifest, MerkleDocument) {
    let mut builder = ManifestBuilder::new("1.0.0", target_epoch);
    for (i, name) in names.iter().enumerate() {
        let facet = Address::repeat_byte(0x10 + i as u8);
        builder
            .add_facet(facet, &[nonpayable(name)], keccak256([0xfe, i as u8]), 2)
            .unwrap();
    }
    let manifest = builder.build().unwrap();
    let tree = MerkleTree::from_leaves(manifest.leaves());
    let doc = MerkleDocument::from_tree(&tree);
    (manifest, doc)
}

#[tokio::test]
async fn commit_apply_activate_happy_path() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);
    let (manifest, doc) = sample_manifest(&["ping"], 1);

    let commit = driver.commit_root(DISPATCHER, manifest.merkle_root, 1).await.unwrap();
    assert!(commit.replaced.is_none());
    assert_eq!(commit.staged.root, manifest.merkle_root);
    assert_eq!(commit.staged.epoch, 1);

    let batch = RouteBatch::from_manifest(&manifest, &doc);
    driver.apply_routes(DISPATCHER, &batch).await.unwrap();

    let activation = driver.activate_committed_root(DISPATCHER).await.unwrap();
    assert_eq!(activation.root, manifest.merkle_root);
    assert_eq!(activation.epoch, 1);

    // Single route: the active root is the route's leaf.
    assert_eq!(activation.root, manifest.routes[0].leaf());

    let state = chain.dispatcher(DISPATCHER).unwrap();
    assert_eq!(state.active_root, manifest.merkle_root);
    assert!(state.pending.is_none());
    assert_eq!(state.applied.len(), 1);
    assert_eq!(state.applied[0].0, manifest.routes[0].selector);
}

#[tokio::test]
async fn commit_rejects_non_successor_epoch() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);

    let err = driver.commit_root(DISPATCHER, Hash32::repeat_byte(1), 2).await.unwrap_err();
    assert_matches!(err, DriverError::EpochMismatch { expected: 1, got: 2 });
    // Rejected before any transaction was sent.
    assert_eq!(chain.sent_count(), 0);
}

#[tokio::test]
async fn activation_too_early_reports_remaining_seconds() {
    let chain = chain_with(MockDispatcher::default().with_delay(3600));
    let driver = driver_on(&chain);

    driver.commit_root(DISPATCHER, Hash32::repeat_byte(1), 1).await.unwrap();

    // One second before the deadline.
    chain.advance_time(3599);
    let err = driver.activate_committed_root(DISPATCHER).await.unwrap_err();
    assert_matches!(err, DriverError::ActivationTooEarly(1));

    // At the deadline.
    chain.advance_time(1);
    let activation = driver.activate_committed_root(DISPATCHER).await.unwrap();
    assert_eq!(activation.root, Hash32::repeat_byte(1));
}

#[tokio::test]
async fn tuple_only_dispatcher_is_probed_and_remembered() {
    let dispatcher = MockDispatcher::default().with_shape(DispatcherShape::TupleOnly);
    let chain = chain_with(dispatcher);
    let driver = driver_on(&chain);

    driver.commit_root(DISPATCHER, Hash32::repeat_byte(0xab), 1).await.unwrap();

    let staged = driver.read_pending(DISPATCHER).await.unwrap();
    assert_eq!(staged.root, Hash32::repeat_byte(0xab));
    assert_eq!(staged.epoch, 1);

    // Second read goes through the remembered shape.
    let again = driver.read_pending(DISPATCHER).await.unwrap();
    assert_eq!(again, staged);
}

#[tokio::test]
async fn getters_only_dispatcher_is_probed() {
    let dispatcher = MockDispatcher::default().with_shape(DispatcherShape::GettersOnly);
    let chain = chain_with(dispatcher);
    let driver = driver_on(&chain);

    driver.commit_root(DISPATCHER, Hash32::repeat_byte(0xcd), 1).await.unwrap();
    let staged = driver.read_pending(DISPATCHER).await.unwrap();
    assert_eq!(staged.root, Hash32::repeat_byte(0xcd));
}

#[tokio::test]
async fn contract_with_neither_shape_is_abi_mismatch() {
    let chain = MockChain::new(31337, DEPLOYER);
    let not_a_dispatcher = Address::repeat_byte(0x77);
    chain.install_code(not_a_dispatcher, prism_types::Bytes::from_static(&[0xfe]));

    let driver = driver_on(&chain);
    let err = driver.read_pending(not_a_dispatcher).await.unwrap_err();
    assert_matches!(err, DriverError::AbiMismatch(address) if address == not_a_dispatcher);
}

#[tokio::test]
async fn second_commit_replaces_pending_and_activation_takes_the_replacement() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);

    let first = Hash32::repeat_byte(0x0a);
    let second = Hash32::repeat_byte(0x0b);

    driver.commit_root(DISPATCHER, first, 1).await.unwrap();
    let replacing = driver.commit_root(DISPATCHER, second, 1).await.unwrap();
    let replaced = replacing.replaced.expect("prior pending root surfaced");
    assert_eq!(replaced.root, first);

    let activation = driver.activate_committed_root(DISPATCHER).await.unwrap();
    assert_eq!(activation.root, second);
    assert_eq!(chain.dispatcher(DISPATCHER).unwrap().active_root, second);
}

#[tokio::test]
async fn activating_with_nothing_pending_fails() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);

    let err = driver.activate_committed_root(DISPATCHER).await.unwrap_err();
    assert_matches!(err, DriverError::NothingPending(_));
}

#[tokio::test]
async fn apply_routes_with_tampered_proof_reverts() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);
    let (manifest, doc) = sample_manifest(&["ping", "pong", "transferAll"], 1);

    driver.commit_root(DISPATCHER, manifest.merkle_root, 1).await.unwrap();

    let mut batch = RouteBatch::from_manifest(&manifest, &doc);
    batch.codehashes[1] = Hash32::repeat_byte(0xee);

    let err = driver.apply_routes(DISPATCHER, &batch).await.unwrap_err();
    assert_matches!(err, DriverError::Chain(ChainError::Revert(_)));
    assert!(chain.dispatcher(DISPATCHER).unwrap().applied.is_empty());
}

#[tokio::test]
async fn mismatched_batch_arrays_fail_before_sending() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);
    let (manifest, doc) = sample_manifest(&["ping", "pong"], 1);

    driver.commit_root(DISPATCHER, manifest.merkle_root, 1).await.unwrap();
    let sent_before = chain.sent_count();

    let mut batch = RouteBatch::from_manifest(&manifest, &doc);
    batch.facets.pop();

    let err = driver.apply_routes(DISPATCHER, &batch).await.unwrap_err();
    assert_matches!(err, DriverError::BatchShape);
    assert_eq!(chain.sent_count(), sent_before);
}

#[tokio::test]
async fn odd_route_count_round_trips_through_the_verifier() {
    let chain = chain_with(MockDispatcher::default());
    let driver = driver_on(&chain);
    let (manifest, doc) = sample_manifest(&["alpha", "bravo", "charlie"], 1);

    driver.commit_root(DISPATCHER, manifest.merkle_root, 1).await.unwrap();
    let batch = RouteBatch::from_manifest(&manifest, &doc);
    driver.apply_routes(DISPATCHER, &batch).await.unwrap();

    assert_eq!(chain.dispatcher(DISPATCHER).unwrap().applied.len(), 3);
}
