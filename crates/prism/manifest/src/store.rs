//! Flat-file artifact store.
//!
//! All core I/O flows through the [`ArtifactStore`] trait so the same
//! pipeline is drivable against a directory tree or entirely in memory.
//! The on-disk contract:
//!
//! ```text
//! deployments/<network>/<Contract>.json
//! manifests/current.manifest.json
//! manifests/current.merkle.json
//! reports/orchestration-<timestamp>.json
//! artifacts/<Contract>.json            (compiler outputs, read-only)
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::artifact::{CompiledArtifact, DeploymentArtifact};
use crate::merkle::MerkleDocument;
use crate::model::Manifest;

/// Store-relative path of the canonical manifest.
pub const MANIFEST_PATH: &str = "manifests/current.manifest.json";
/// Store-relative path of the canonical Merkle commitment document.
pub const MERKLE_PATH: &str = "manifests/current.merkle.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads and writes the flat-file documents the pipeline exchanges.
///
/// Writes are atomic at single-file granularity and a store never mutates a
/// file it has read. Reads fail closed: malformed JSON is `Parse`, a missing
/// network or contract is `NotFound`.
pub trait ArtifactStore: Send + Sync {
    fn read_deployment(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<DeploymentArtifact, StoreError>;

    fn write_deployment(
        &self,
        network: &str,
        contract: &str,
        artifact: &DeploymentArtifact,
    ) -> Result<(), StoreError>;

    fn read_compiled(&self, contract: &str) -> Result<CompiledArtifact, StoreError>;

    fn read_manifest(&self, path: &str) -> Result<Manifest, StoreError>;

    fn write_manifest(&self, path: &str, manifest: &Manifest) -> Result<(), StoreError>;

    fn read_merkle(&self, path: &str) -> Result<MerkleDocument, StoreError>;

    fn write_merkle(&self, path: &str, document: &MerkleDocument) -> Result<(), StoreError>;

    /// Writes a run report under `reports/` and returns the store-relative
    /// path it landed at.
    fn write_report(
        &self,
        name: &str,
        report: &serde_json::Value,
    ) -> Result<String, StoreError>;
}

/// [`ArtifactStore`] over a base directory.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    base: PathBuf,
}

impl FsArtifactStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn deployment_path(&self, network: &str, contract: &str) -> PathBuf {
        self.base.join("deployments").join(network).join(format!("{contract}.json"))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path, resource: &str) -> Result<T, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(resource.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Write-temp-then-rename in the destination directory, so a crash never
    /// leaves a half-written artifact behind.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let parent = path.parent().expect("store paths always have a parent");
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, value).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        trace!(path = %path.display(), "Wrote artifact.");
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn read_deployment(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<DeploymentArtifact, StoreError> {
        let path = self.deployment_path(network, contract);
        self.read_json(&path, &format!("deployments/{network}/{contract}"))
    }

    fn write_deployment(
        &self,
        network: &str,
        contract: &str,
        artifact: &DeploymentArtifact,
    ) -> Result<(), StoreError> {
        self.write_json(&self.deployment_path(network, contract), artifact)
    }

    fn read_compiled(&self, contract: &str) -> Result<CompiledArtifact, StoreError> {
        let path = self.base.join("artifacts").join(format!("{contract}.json"));
        self.read_json(&path, &format!("artifacts/{contract}"))
    }

    fn read_manifest(&self, path: &str) -> Result<Manifest, StoreError> {
        self.read_json(&self.base.join(path), path)
    }

    fn write_manifest(&self, path: &str, manifest: &Manifest) -> Result<(), StoreError> {
        self.write_json(&self.base.join(path), manifest)
    }

    fn read_merkle(&self, path: &str) -> Result<MerkleDocument, StoreError> {
        self.read_json(&self.base.join(path), path)
    }

    fn write_merkle(&self, path: &str, document: &MerkleDocument) -> Result<(), StoreError> {
        self.write_json(&self.base.join(path), document)
    }

    fn write_report(
        &self,
        name: &str,
        report: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let relative = format!("reports/{name}");
        self.write_json(&self.base.join(&relative), report)?;
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{DateTime, Utc};
    use prism_types::{Address, Hash32};

    use super::*;
    use crate::builder::tests::manifest_with_routes;

    fn store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        (dir, store)
    }

    fn sample_artifact() -> DeploymentArtifact {
        DeploymentArtifact {
            contract_name: "Factory".into(),
            network: "alpha".into(),
            address: Address::repeat_byte(0xaa),
            codehash: Hash32::repeat_byte(1),
            salt: Hash32::ZERO,
            init_code_hash: Hash32::repeat_byte(2),
            deployer: Address::repeat_byte(9),
            tx_hash: None,
            block_number: None,
            timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn deployment_round_trip_at_canonical_path() {
        let (dir, store) = store();
        store.write_deployment("alpha", "Factory", &sample_artifact()).unwrap();

        assert!(dir.path().join("deployments/alpha/Factory.json").exists());
        assert_eq!(store.read_deployment("alpha", "Factory").unwrap(), sample_artifact());
    }

    #[test]
    fn missing_network_is_not_found() {
        let (_dir, store) = store();
        assert_matches!(
            store.read_deployment("nowhere", "Factory"),
            Err(StoreError::NotFound(_))
        );
    }

    #[test]
    fn malformed_json_fails_closed() {
        let (dir, store) = store();
        let path = dir.path().join("deployments/alpha");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("Factory.json"), "{ not json").unwrap();

        assert_matches!(
            store.read_deployment("alpha", "Factory"),
            Err(StoreError::Parse { .. })
        );
    }

    #[test]
    fn manifest_round_trip_reproduces_root() {
        let (_dir, store) = store();
        let manifest = manifest_with_routes(&["ping()", "pong()"]);

        store.write_manifest(MANIFEST_PATH, &manifest).unwrap();
        let parsed = store.read_manifest(MANIFEST_PATH).unwrap();

        parsed.validate().unwrap();
        assert_eq!(parsed.merkle_root, manifest.merkle_root);
    }

    #[test]
    fn report_lands_under_reports() {
        let (dir, store) = store();
        let path = store
            .write_report("orchestration-0.json", &serde_json::json!({ "status": "SUCCESS" }))
            .unwrap();

        assert_eq!(path, "reports/orchestration-0.json");
        assert!(dir.path().join(path).exists());
    }
}
