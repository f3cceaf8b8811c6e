//! Preflight checks against in-memory chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use prism_manifest::abi::{AbiEntry, AbiFunction, StateMutability};
use prism_manifest::{CompiledArtifact, Manifest, ManifestBuilder, MerkleDocument, MerkleTree};
use prism_ops::{Preflight, RunConfig};
use prism_test_utils::{MockChain, MockDispatcher};
use prism_types::{keccak256, Address, Bytes, Hash32, U256, MAX_CONTRACT_SIZE};
use prism_utils::ChainClient;

const DEPLOYER: Address = Address::repeat_byte(0xe0);
const DISPATCHER: Address = Address::repeat_byte(0xd1);

fn factory_artifact() -> CompiledArtifact {
    CompiledArtifact {
        contract_name: "Factory".into(),
        abi: vec![],
        init_code: Bytes::from_static(b"factory-init"),
        runtime_codehash: keccak256(b"factory-runtime"),
    }
}

fn clients_for(chains: &[(&str, MockChain)]) -> BTreeMap<String, Arc<dyn ChainClient>> {
    chains
        .iter()
        .map(|(name, chain)| {
            (name.to_string(), Arc::new(chain.clone()) as Arc<dyn ChainClient>)
        })
        .collect()
}

fn config_for(networks: &[&str]) -> RunConfig {
    RunConfig { networks: networks.iter().map(|n| n.to_string()).collect(), ..Default::default() }
}

/// Installs the facet runtimes [`sample_manifest`] claims, so the liveness
/// check holds.
fn install_facets(chain: &MockChain) {
    for i in 0..3u8 {
        chain.install_code(Address::repeat_byte(0x20 + i), Bytes::from(vec![i]));
    }
}

fn sample_manifest(target_epoch: u64) -> (Manifest, MerkleDocument) {
    let mut builder = ManifestBuilder::new("1.0.0", target_epoch);
    for (i, name) in ["ping", "pong", "swap"].iter().enumerate() {
        let entry = AbiEntry::Function(AbiFunction {
            name: (*name).into(),
            inputs: vec![],
            outputs: vec![],
            state_mutability: StateMutability::Nonpayable,
        });
        builder
            .add_facet(Address::repeat_byte(0x20 + i as u8), &[entry], keccak256([i as u8]), 4)
            .unwrap();
    }
    let manifest = builder.build().unwrap();
    let doc = MerkleDocument::from_tree(&MerkleTree::from_leaves(manifest.leaves()));
    (manifest, doc)
}

#[tokio::test]
async fn parity_holds_for_identical_deployers() {
    let chains =
        [("alpha", MockChain::new(1, DEPLOYER)), ("beta", MockChain::new(2, DEPLOYER))];
    let clients = clients_for(&chains);
    let config = config_for(&["alpha", "beta"]);

    let (predicted, report) =
        Preflight::new(&clients, &config).parity_only(&factory_artifact()).await;

    assert!(report.passed(), "{report:?}");
    assert!(predicted.is_some());
}

#[tokio::test]
async fn diverging_deployers_abort_with_address_parity() {
    // Same factory, different deployer key on one chain: the predictions
    // cannot collapse and nothing may be sent.
    let alpha = MockChain::new(1, DEPLOYER);
    let beta = MockChain::new(2, Address::repeat_byte(0xe1));
    let chains = [("alpha", alpha.clone()), ("beta", beta.clone())];
    let clients = clients_for(&chains);
    let config = config_for(&["alpha", "beta"]);

    let (predicted, report) =
        Preflight::new(&clients, &config).parity_only(&factory_artifact()).await;

    assert!(predicted.is_none());
    assert!(!report.passed());
    assert!(report.errors().any(|record| record.kind == "AddressParity"));
    assert_eq!(alpha.sent_count(), 0);
    assert_eq!(beta.sent_count(), 0);
}

#[tokio::test]
async fn underfunded_deployer_fails_connectivity() {
    let chain = MockChain::new(1, DEPLOYER);
    chain.set_balance(DEPLOYER, U256::from(1u64));
    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);

    let (_, report) = Preflight::new(&clients, &config).parity_only(&factory_artifact()).await;

    assert!(!report.passed());
    assert!(report.errors().any(|record| record.kind == "InsufficientBalance"));
}

#[tokio::test]
async fn oversized_init_code_fails_bytecode_check() {
    let chain = MockChain::new(1, DEPLOYER);
    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);

    let artifact = CompiledArtifact {
        init_code: Bytes::from(vec![0u8; MAX_CONTRACT_SIZE + 1]),
        ..factory_artifact()
    };
    let (_, report) = Preflight::new(&clients, &config).parity_only(&artifact).await;

    assert!(report.errors().any(|record| record.kind == "InitCodeTooLarge"));
}

#[tokio::test]
async fn boundary_init_code_size_passes() {
    let chain = MockChain::new(1, DEPLOYER);
    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);

    let artifact = CompiledArtifact {
        init_code: Bytes::from(vec![0u8; MAX_CONTRACT_SIZE]),
        ..factory_artifact()
    };
    let (_, report) = Preflight::new(&clients, &config).parity_only(&artifact).await;

    assert!(report.passed(), "{report:?}");
}

#[tokio::test]
async fn sampled_proofs_reproduce_and_tampering_is_caught() {
    let chain = MockChain::new(1, DEPLOYER);
    install_facets(&chain);
    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);
    let (manifest, doc) = sample_manifest(1);

    let preflight = Preflight::new(&clients, &config);
    let (_, report) = preflight
        .full(&factory_artifact(), &manifest, &doc, &BTreeMap::new())
        .await;
    assert!(report.passed(), "{report:?}");

    // Corrupt one stored proof; the local reproduction must fail.
    let mut bad_doc = doc.clone();
    bad_doc.proofs[0][0].sibling = Hash32::repeat_byte(0x66);
    let (_, report) = preflight
        .full(&factory_artifact(), &manifest, &bad_doc, &BTreeMap::new())
        .await;

    assert!(!report.passed());
    assert!(report.errors().any(|record| record.kind == "ProofFailed"));
}

#[tokio::test]
async fn epoch_check_requires_exact_successor() {
    let chain = MockChain::new(1, DEPLOYER);
    install_facets(&chain);
    let mut dispatcher = MockDispatcher::default();
    dispatcher.active_epoch = 5;
    chain.install_dispatcher(DISPATCHER, dispatcher);

    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);
    let dispatchers = BTreeMap::from([("alpha".to_string(), DISPATCHER)]);
    let preflight = Preflight::new(&clients, &config);

    let (manifest, doc) = sample_manifest(6);
    let (_, report) = preflight.full(&factory_artifact(), &manifest, &doc, &dispatchers).await;
    assert!(report.passed(), "{report:?}");

    let (manifest, doc) = sample_manifest(3);
    let (_, report) = preflight.full(&factory_artifact(), &manifest, &doc, &dispatchers).await;
    assert!(report.errors().any(|record| record.kind == "EpochMismatch"));
}

#[tokio::test]
async fn pre_existing_factory_is_a_warning_not_an_error() {
    let chain = MockChain::new(1, DEPLOYER);
    install_facets(&chain);
    let artifact = factory_artifact();

    // Put the expected runtime at the predicted address.
    let predicted = prism_types::create2_address(
        chain.create2_deployer(),
        prism_types::FROZEN_FACTORY_SALT,
        prism_types::init_code_hash(&artifact.init_code),
    );
    chain.install_code(predicted, Bytes::from_static(b"factory-runtime"));

    let clients = clients_for(&[("alpha", chain)]);
    let config = config_for(&["alpha"]);
    let (manifest, doc) = sample_manifest(1);

    let (_, report) = Preflight::new(&clients, &config)
        .full(&artifact, &manifest, &doc, &BTreeMap::new())
        .await;

    assert!(report.passed(), "{report:?}");
    let existing = report
        .checks
        .iter()
        .find(|check| check.name == "existing-deployment")
        .unwrap();
    assert_eq!(existing.warnings.len(), 1);
}
