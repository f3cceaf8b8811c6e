#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod abi;
pub mod artifact;
pub mod builder;
pub mod merkle;
pub mod model;
pub mod store;

pub use artifact::{CompiledArtifact, CrossChainDeployment, DeploymentArtifact};
pub use builder::{ManifestBuilder, ManifestError, ManifestPolicy};
pub use merkle::{MerkleDocument, MerkleTree, ProofStep};
pub use model::{FacetEntry, Manifest, Route};
pub use store::{ArtifactStore, FsArtifactStore, StoreError, MANIFEST_PATH, MERKLE_PATH};
