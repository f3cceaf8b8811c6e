//! An [`ArtifactStore`] held entirely in memory, keyed by the same
//! store-relative paths the filesystem layout uses.

use std::collections::BTreeMap;
use std::sync::Mutex;

use prism_manifest::{
    ArtifactStore, CompiledArtifact, DeploymentArtifact, Manifest, MerkleDocument, StoreError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let files = self.files.lock().expect("memory store poisoned");
        let raw = files.get(path).ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        serde_json::from_str(raw)
            .map_err(|e| StoreError::Parse { path: path.to_string(), detail: e.to_string() })
    }

    fn write<T: Serialize>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Parse { path: path.to_string(), detail: e.to_string() })?;
        self.files.lock().expect("memory store poisoned").insert(path.to_string(), raw);
        Ok(())
    }

    fn deployment_path(network: &str, contract: &str) -> String {
        format!("deployments/{network}/{contract}.json")
    }

    /// Pre-stages a compiled artifact under `artifacts/<name>.json`.
    pub fn insert_compiled(&self, artifact: &CompiledArtifact) {
        self.write(&format!("artifacts/{}.json", artifact.contract_name), artifact)
            .expect("compiled artifact serializes");
    }

    /// Pre-stages a deployment artifact.
    pub fn insert_deployment(&self, artifact: &DeploymentArtifact) {
        self.write(
            &Self::deployment_path(&artifact.network, &artifact.contract_name),
            artifact,
        )
        .expect("deployment artifact serializes");
    }

    /// Every path currently stored, in order.
    pub fn paths(&self) -> Vec<String> {
        self.files.lock().expect("memory store poisoned").keys().cloned().collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().expect("memory store poisoned").contains_key(path)
    }

    /// Raw JSON at `path`, if present.
    pub fn raw(&self, path: &str) -> Option<String> {
        self.files.lock().expect("memory store poisoned").get(path).cloned()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn read_deployment(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<DeploymentArtifact, StoreError> {
        self.read(&Self::deployment_path(network, contract))
    }

    fn write_deployment(
        &self,
        network: &str,
        contract: &str,
        artifact: &DeploymentArtifact,
    ) -> Result<(), StoreError> {
        self.write(&Self::deployment_path(network, contract), artifact)
    }

    fn read_compiled(&self, contract: &str) -> Result<CompiledArtifact, StoreError> {
        self.read(&format!("artifacts/{contract}.json"))
    }

    fn read_manifest(&self, path: &str) -> Result<Manifest, StoreError> {
        self.read(path)
    }

    fn write_manifest(&self, path: &str, manifest: &Manifest) -> Result<(), StoreError> {
        self.write(path, manifest)
    }

    fn read_merkle(&self, path: &str) -> Result<MerkleDocument, StoreError> {
        self.read(path)
    }

    fn write_merkle(&self, path: &str, document: &MerkleDocument) -> Result<(), StoreError> {
        self.write(path, document)
    }

    fn write_report(
        &self,
        name: &str,
        report: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let path = format!("reports/{name}");
        self.write(&path, report)?;
        Ok(path)
    }
}
