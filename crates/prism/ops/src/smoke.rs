//! Post-deployment smoke tests.

use std::sync::Arc;

use alloy_sol_types::SolCall;
use prism_manifest::{ArtifactStore, StoreError};
use prism_types::{Address, Hash32};
use prism_utils::{ChainClient, ChainError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::abi::IFactory;
use crate::config::{DISPATCHER_CONTRACT, FACTORY_CONTRACT};
use crate::dispatcher::{DispatcherDriver, DriverError};

#[derive(Debug, Error)]
pub enum SmokeError {
    #[error("codehash drift at {address}: artifact {expected}, chain {actual}")]
    CodehashDrift { address: Address, expected: Hash32, actual: Hash32 },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the smoke stage observed on one network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmokeOutcome {
    pub factory_owner: Option<Address>,
    pub dispatcher_paused: Option<bool>,
    pub codehashes_verified: u32,
}

/// Reads back the factory owner and dispatcher pause state, and re-checks
/// every written artifact's codehash against the chain.
pub async fn run_smoke(
    chain: &Arc<dyn ChainClient>,
    store: &Arc<dyn ArtifactStore>,
    network: &str,
) -> Result<SmokeOutcome, SmokeError> {
    let mut outcome =
        SmokeOutcome { factory_owner: None, dispatcher_paused: None, codehashes_verified: 0 };

    let factory = store.read_deployment(network, FACTORY_CONTRACT)?;
    let raw = chain
        .call(factory.address, IFactory::ownerCall {}.abi_encode().into())
        .await?;
    let owner = IFactory::ownerCall::abi_decode_returns(&raw, true)
        .map_err(|e| ChainError::Decode(e.to_string()))?
        ._0;
    outcome.factory_owner = Some(owner);

    for contract in [FACTORY_CONTRACT, DISPATCHER_CONTRACT] {
        let artifact = match store.read_deployment(network, contract) {
            Ok(artifact) => artifact,
            Err(StoreError::NotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        let actual = chain.get_codehash(artifact.address).await?;
        if actual != artifact.codehash {
            return Err(SmokeError::CodehashDrift {
                address: artifact.address,
                expected: artifact.codehash,
                actual,
            });
        }
        outcome.codehashes_verified += 1;

        if contract == DISPATCHER_CONTRACT {
            let driver = DispatcherDriver::new(Arc::clone(chain));
            outcome.dispatcher_paused = Some(driver.paused(artifact.address).await?);
        }
    }

    debug!(network, owner = ?outcome.factory_owner, paused = ?outcome.dispatcher_paused, "Smoke test passed.");
    Ok(outcome)
}
