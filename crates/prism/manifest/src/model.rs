//! The canonical routing manifest document.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use prism_types::{keccak256, Address, Hash32, Selector};
use serde::{Deserialize, Serialize};

use crate::builder::ManifestError;
use crate::merkle::MerkleTree;

/// A single routing entry: calls with `selector` are dispatched to `facet`,
/// which must carry exactly `codehash` on chain for the route to be live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub selector: Selector,
    pub facet: Address,
    pub codehash: Hash32,
}

impl Route {
    /// Merkle leaf encoding: `keccak256( selector[4] || facet[20] || codehash[32] )`.
    pub fn leaf(&self) -> Hash32 {
        let mut preimage = [0u8; 56];
        preimage[..4].copy_from_slice(self.selector.as_slice());
        preimage[4..24].copy_from_slice(self.facet.as_slice());
        preimage[24..].copy_from_slice(self.codehash.as_slice());
        keccak256(preimage)
    }

    /// The canonical total order over routes: lexicographic by selector,
    /// ties broken by facet then codehash. This order is shared with the
    /// on-chain verifier; both sides must fold leaves identically.
    pub fn canonical_cmp(&self, other: &Route) -> Ordering {
        self.selector
            .cmp(&other.selector)
            .then_with(|| self.facet.cmp(&other.facet))
            .then_with(|| self.codehash.cmp(&other.codehash))
    }
}

/// Per-facet summary: its codehash and every selector it serves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetEntry {
    pub codehash: Hash32,
    pub selectors: Vec<Selector>,
}

/// The routing manifest for one release.
///
/// `routes` is stored in canonical order and `merkle_root` commits to that
/// exact order. The document is immutable once built; downstream stages only
/// ever read it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// The epoch this manifest is intended to be committed under. Must equal
    /// `active_epoch + 1` on every target dispatcher.
    pub target_epoch: u64,
    pub facets: BTreeMap<Address, FacetEntry>,
    pub routes: Vec<Route>,
    pub merkle_root: Hash32,
    /// Set when the manifest carries no routes. A zero root is only
    /// committable in bootstrap mode.
    #[serde(default)]
    pub empty: bool,
}

impl Manifest {
    /// Leaves in manifest order.
    pub fn leaves(&self) -> Vec<Hash32> {
        self.routes.iter().map(Route::leaf).collect()
    }

    /// Re-checks every structural invariant of a manifest read from disk.
    ///
    /// Fails closed: a manifest that does not reproduce its own root, or
    /// whose route table disagrees with its facet table, is rejected.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.selector) {
                return Err(ManifestError::DuplicateSelector(route.selector));
            }

            let facet = self
                .facets
                .get(&route.facet)
                .ok_or(ManifestError::UnknownFacet(route.facet))?;
            if facet.codehash != route.codehash {
                return Err(ManifestError::CodehashMismatch {
                    expected: facet.codehash,
                    actual: route.codehash,
                });
            }
            if !facet.selectors.contains(&route.selector) {
                return Err(ManifestError::UnlistedSelector {
                    selector: route.selector,
                    facet: route.facet,
                });
            }
        }

        for window in self.routes.windows(2) {
            if window[0].canonical_cmp(&window[1]) != Ordering::Less {
                return Err(ManifestError::RoutesOutOfOrder);
            }
        }

        let tree = MerkleTree::from_leaves(self.leaves());
        if tree.root() != self.merkle_root {
            return Err(ManifestError::RootMismatch {
                declared: self.merkle_root,
                computed: tree.root(),
            });
        }
        if self.empty != self.routes.is_empty() {
            return Err(ManifestError::EmptyFlagMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use prism_types::selector;

    use super::*;
    use crate::builder::tests::manifest_with_routes;

    fn route(sig: &str, facet: u8, code: u8) -> Route {
        Route {
            selector: selector(sig),
            facet: Address::repeat_byte(facet),
            codehash: Hash32::repeat_byte(code),
        }
    }

    #[test]
    fn leaf_is_keccak_of_concatenation() {
        let r = route("ping()", 0x11, 0x22);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(r.selector.as_slice());
        preimage.extend_from_slice(r.facet.as_slice());
        preimage.extend_from_slice(r.codehash.as_slice());
        assert_eq!(r.leaf(), keccak256(&preimage));
    }

    #[test]
    fn canonical_order_is_selector_then_facet_then_codehash() {
        let a = route("aaa()", 0x01, 0x01);
        let mut b = a.clone();
        b.facet = Address::repeat_byte(0x02);

        assert_eq!(a.canonical_cmp(&b), Ordering::Less);

        let mut c = a.clone();
        c.codehash = Hash32::repeat_byte(0x02);
        assert_eq!(a.canonical_cmp(&c), Ordering::Less);
    }

    #[test]
    fn serde_round_trip_preserves_root() {
        let manifest = manifest_with_routes(&["ping()", "pong()", "transfer(address,uint256)"]);
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();

        parsed.validate().unwrap();
        similar_asserts::assert_eq!(parsed.routes, manifest.routes);
        assert_eq!(parsed.merkle_root, manifest.merkle_root);
        assert_eq!(
            MerkleTree::from_leaves(parsed.leaves()).root(),
            manifest.merkle_root
        );
    }

    #[test]
    fn validate_rejects_tampered_route() {
        let mut manifest = manifest_with_routes(&["ping()", "pong()"]);
        manifest.routes[0].codehash = Hash32::repeat_byte(0xde);

        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::CodehashMismatch { .. })
        ));
    }
}
