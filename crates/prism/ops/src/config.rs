//! The immutable run configuration.

use std::time::Duration;

use prism_manifest::{MANIFEST_PATH, MERKLE_PATH};
use prism_types::{Hash32, U256, FROZEN_FACTORY_SALT};
use prism_utils::RetryPolicy;

/// Artifact name of the factory contract.
pub const FACTORY_CONTRACT: &str = "Factory";
/// Artifact name of the dispatcher contract.
pub const DISPATCHER_CONTRACT: &str = "Dispatcher";

/// Everything a run needs to know, resolved once from CLI flags and the
/// environment, then threaded explicitly. No step consults ambient state.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub networks: Vec<String>,
    /// Store-relative manifest path.
    pub manifest_path: String,
    /// Store-relative Merkle commitment path.
    pub merkle_path: String,
    pub dry_run: bool,
    /// Deploy dispatchers during the run; otherwise reuse the per-network
    /// deployment artifacts.
    pub deploy_dispatcher: bool,
    /// Deploy dispatchers in paused mode.
    pub paused: bool,
    /// Allow committing an empty (zero-root) manifest.
    pub bootstrap: bool,
    pub frozen_salt: Hash32,
    /// Minimum deployer balance per network, in wei.
    pub min_balance: U256,
    pub confirmations: u64,
    /// How many routes the preflight re-proves locally.
    pub proof_sample: usize,
    pub retry: RetryPolicy,
    /// Wall-clock budget for the whole pipeline; exceeding it cancels.
    pub wall_clock_budget: Option<Duration>,
    /// Operator override for the activation-delay wait. When `None` the
    /// earliest activation time is taken from the dispatcher.
    pub activation_delay_override: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            networks: vec![],
            manifest_path: MANIFEST_PATH.to_string(),
            merkle_path: MERKLE_PATH.to_string(),
            dry_run: false,
            deploy_dispatcher: false,
            paused: false,
            bootstrap: false,
            frozen_salt: FROZEN_FACTORY_SALT,
            // 0.01 ETH-equivalent.
            min_balance: U256::from(10_000_000_000_000_000u64),
            confirmations: 1,
            proof_sample: 16,
            retry: RetryPolicy::default(),
            wall_clock_budget: None,
            activation_delay_override: None,
        }
    }
}
