//! Builds the canonical manifest from deployed facet artifacts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prism_types::{Address, Hash32, Selector, MAX_CONTRACT_SIZE};
use thiserror::Error;
use tracing::{debug, trace};

use crate::abi::AbiEntry;
use crate::merkle::MerkleTree;
use crate::model::{FacetEntry, Manifest, Route};

/// Admin surface that is never routable, regardless of policy.
const DENY_LIST: &[&str] = &[
    "supportsInterface",
    "hasRole",
    "getRoleAdmin",
    "grantRole",
    "revokeRole",
    "renounceRole",
    "initialize",
    "reinitialize",
];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("selector {0} is claimed by more than one facet")]
    DuplicateSelector(Selector),
    #[error("identical route present twice")]
    DuplicateRoute,
    #[error("facet {0} added more than once")]
    DuplicateFacet(Address),
    #[error("no code at facet {0}")]
    NoCodeAtFacet(Address),
    #[error("codehash mismatch: expected {expected}, actual {actual}")]
    CodehashMismatch { expected: Hash32, actual: Hash32 },
    #[error("facet runtime code is {0} bytes, limit is {MAX_CONTRACT_SIZE}")]
    FacetTooLarge(usize),
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),
    #[error("route targets facet {0} absent from the facet table")]
    UnknownFacet(Address),
    #[error("selector {selector} is not listed under facet {facet}")]
    UnlistedSelector { selector: Selector, facet: Address },
    #[error("routes are not in canonical order")]
    RoutesOutOfOrder,
    #[error("declared root {declared} does not reproduce (computed {computed})")]
    RootMismatch { declared: Hash32, computed: Hash32 },
    #[error("empty flag disagrees with the route table")]
    EmptyFlagMismatch,
}

/// Selector extraction policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifestPolicy {
    /// Route `view`/`pure` functions too. Off by default; read-only surface
    /// is normally served directly, not through the dispatcher.
    pub include_views: bool,
}

/// Accumulates facets and emits a validated [`Manifest`].
///
/// The builder is pure: callers resolve on-chain codehashes first and feed
/// them in, so the same builder is usable against a live chain or entirely
/// in memory.
#[derive(Debug)]
pub struct ManifestBuilder {
    version: String,
    target_epoch: u64,
    policy: ManifestPolicy,
    timestamp: Option<DateTime<Utc>>,
    facets: BTreeMap<Address, FacetEntry>,
}

impl ManifestBuilder {
    pub fn new(version: impl Into<String>, target_epoch: u64) -> Self {
        Self {
            version: version.into(),
            target_epoch,
            policy: ManifestPolicy::default(),
            timestamp: None,
            facets: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: ManifestPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pins the manifest timestamp instead of sampling the clock at build
    /// time. Used by tests and replayed builds.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Registers a deployed facet: its ABI, observed on-chain codehash, and
    /// runtime code length.
    pub fn add_facet(
        &mut self,
        address: Address,
        abi: &[AbiEntry],
        codehash: Hash32,
        code_len: usize,
    ) -> Result<(), ManifestError> {
        if self.facets.contains_key(&address) {
            return Err(ManifestError::DuplicateFacet(address));
        }
        if code_len == 0 || codehash == Hash32::ZERO {
            return Err(ManifestError::NoCodeAtFacet(address));
        }
        if code_len > MAX_CONTRACT_SIZE {
            return Err(ManifestError::FacetTooLarge(code_len));
        }

        let mut selectors = Vec::new();
        for function in abi.iter().filter_map(AbiEntry::as_function) {
            if function.name.starts_with('_') {
                continue;
            }
            if DENY_LIST.contains(&function.name.as_str()) {
                continue;
            }
            if function.is_read_only() && !self.policy.include_views {
                continue;
            }

            let selector = function.selector();
            trace!(%address, signature = function.signature(), %selector, "Routable function.");
            if selectors.contains(&selector) {
                return Err(ManifestError::DuplicateSelector(selector));
            }
            selectors.push(selector);
        }

        self.facets.insert(address, FacetEntry { codehash, selectors });
        Ok(())
    }

    /// Validates the accumulated facets and emits the manifest with its
    /// Merkle commitment.
    pub fn build(self) -> Result<Manifest, ManifestError> {
        let mut routes = Vec::new();
        for (address, entry) in &self.facets {
            for selector in &entry.selectors {
                routes.push(Route {
                    selector: *selector,
                    facet: *address,
                    codehash: entry.codehash,
                });
            }
        }

        routes.sort_by(Route::canonical_cmp);
        for window in routes.windows(2) {
            if window[0] == window[1] {
                return Err(ManifestError::DuplicateRoute);
            }
            if window[0].selector == window[1].selector {
                return Err(ManifestError::DuplicateSelector(window[0].selector));
            }
        }

        let tree = MerkleTree::from_leaves(routes.iter().map(Route::leaf).collect());
        debug!(
            routes = routes.len(),
            facets = self.facets.len(),
            root = %tree.root(),
            "Built manifest."
        );

        Ok(Manifest {
            version: self.version,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            target_epoch: self.target_epoch,
            facets: self.facets,
            routes,
            merkle_root: tree.root(),
            empty: tree.is_empty(),
        })
    }
}
