//! Deployment artifacts and their cross-chain aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prism_types::{Address, Bytes, Hash32};
use serde::{Deserialize, Serialize};

use crate::abi::AbiEntry;

/// The record written after a contract lands on one network.
///
/// One file per `(network, contract)` pair; the network task that deployed
/// the contract is the only writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    pub contract_name: String,
    pub network: String,
    pub address: Address,
    pub codehash: Hash32,
    pub salt: Hash32,
    pub init_code_hash: Hash32,
    pub deployer: Address,
    /// `None` when the contract was already present at the predicted address
    /// and no transaction was sent (idempotent redeploy).
    pub tx_hash: Option<Hash32>,
    pub block_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// One contract's artifacts across every target network.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CrossChainDeployment {
    pub contract_name: String,
    pub networks: BTreeMap<String, DeploymentArtifact>,
}

impl CrossChainDeployment {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self { contract_name: contract_name.into(), networks: BTreeMap::new() }
    }

    pub fn insert(&mut self, artifact: DeploymentArtifact) {
        self.networks.insert(artifact.network.clone(), artifact);
    }

    /// `true` when every network's address collapses to exactly one value.
    /// Vacuously true for zero or one network.
    pub fn identical(&self) -> bool {
        let mut addresses = self.networks.values().map(|a| a.address);
        match addresses.next() {
            Some(first) => addresses.all(|a| a == first),
            None => true,
        }
    }

    /// The single shared address, when [`identical`](Self::identical) holds.
    pub fn shared_address(&self) -> Option<Address> {
        if self.identical() {
            self.networks.values().next().map(|a| a.address)
        } else {
            None
        }
    }
}

/// A compiler output artifact: everything needed to predict, deploy and
/// verify one contract. Produced at build time, read-only at run time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub contract_name: String,
    pub abi: Vec<AbiEntry>,
    /// Constructor bytecode concatenated with ABI-encoded constructor args.
    pub init_code: Bytes,
    /// Compile-time hash of the runtime bytecode this init code deploys.
    pub runtime_codehash: Hash32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(network: &str, address: Address) -> DeploymentArtifact {
        DeploymentArtifact {
            contract_name: "Factory".into(),
            network: network.into(),
            address,
            codehash: Hash32::repeat_byte(1),
            salt: Hash32::ZERO,
            init_code_hash: Hash32::repeat_byte(2),
            deployer: Address::repeat_byte(9),
            tx_hash: Some(Hash32::repeat_byte(3)),
            block_number: Some(42),
            timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn identical_holds_when_all_addresses_agree() {
        let shared = Address::repeat_byte(0xaa);
        let mut cross = CrossChainDeployment::new("Factory");
        cross.insert(artifact("alpha", shared));
        cross.insert(artifact("beta", shared));

        assert!(cross.identical());
        assert_eq!(cross.shared_address(), Some(shared));
    }

    #[test]
    fn identical_fails_on_divergence() {
        let mut cross = CrossChainDeployment::new("Factory");
        cross.insert(artifact("alpha", Address::repeat_byte(0xaa)));
        cross.insert(artifact("beta", Address::repeat_byte(0xbb)));

        assert!(!cross.identical());
        assert_eq!(cross.shared_address(), None);
    }

    #[test]
    fn artifact_serde_round_trip() {
        let a = artifact("alpha", Address::repeat_byte(0xaa));
        let json = serde_json::to_string(&a).unwrap();
        let parsed: DeploymentArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, a);
    }
}
