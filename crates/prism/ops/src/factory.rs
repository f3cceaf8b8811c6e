//! Deterministic contract deployment.
//!
//! Deploys are salted creations; the resulting address is derived before
//! the transaction is sent, and the receipt and post-state are checked
//! against that prediction. Re-running against a chain that already holds
//! the contract is a no-op that reports the existing address.

use std::sync::Arc;

use chrono::Utc;
use prism_manifest::{CompiledArtifact, DeploymentArtifact};
use prism_types::{create2_address, init_code_hash, Address, Bytes, Hash32};
use prism_utils::{ChainClient, TxRequest};
use tracing::{debug, info};

use crate::orchestrate::OrchestrateError;

/// Result of one deterministic deployment attempt.
#[derive(Clone, Debug)]
pub struct DeployOutcome {
    pub artifact: DeploymentArtifact,
    /// `false` when the contract already existed (or the run is dry) and no
    /// transaction was sent.
    pub deployed: bool,
    pub warnings: Vec<String>,
}

/// Deploys `artifact` under `salt` on one network, idempotently.
pub async fn deploy_deterministic(
    chain: &Arc<dyn ChainClient>,
    network: &str,
    artifact: &CompiledArtifact,
    init_code: Bytes,
    salt: Hash32,
    confirmations: u64,
    dry_run: bool,
) -> Result<DeployOutcome, OrchestrateError> {
    let code_hash = init_code_hash(&init_code);
    let deployer = chain.create2_deployer();
    let predicted = create2_address(deployer, salt, code_hash);
    debug!(network, contract = artifact.contract_name, %predicted, "Predicted deployment address.");

    let record = |tx: Option<&prism_utils::TxReceipt>, codehash: Hash32| DeploymentArtifact {
        contract_name: artifact.contract_name.clone(),
        network: network.to_string(),
        address: predicted,
        codehash,
        salt,
        init_code_hash: code_hash,
        deployer,
        tx_hash: tx.map(|r| r.tx_hash),
        block_number: tx.and_then(|r| r.block_number),
        timestamp: Utc::now(),
    };

    // Idempotent path: code already at the predicted address.
    let existing = chain.get_codehash(predicted).await?;
    if existing != Hash32::ZERO {
        if existing != artifact.runtime_codehash {
            return Err(OrchestrateError::CodehashMismatch {
                expected: artifact.runtime_codehash,
                actual: existing,
            });
        }
        return Ok(DeployOutcome {
            artifact: record(None, existing),
            deployed: false,
            warnings: vec![format!(
                "{} already deployed at {predicted} on {network}",
                artifact.contract_name
            )],
        });
    }

    if dry_run {
        return Ok(DeployOutcome {
            artifact: record(None, artifact.runtime_codehash),
            deployed: false,
            warnings: vec![],
        });
    }

    let tx = TxRequest::create2(salt, init_code);
    let gas = chain.estimate_gas(&tx).await?;
    let gas_price = chain.gas_price().await?;
    debug!(
        network,
        contract = artifact.contract_name,
        gas,
        %gas_price,
        "Deployment cost estimated."
    );

    let receipt = chain.send_and_wait(tx, confirmations).await?;

    // When the chain reports the created address it must match the
    // prediction exactly; parity across chains depends on it.
    if let Some(actual) = receipt.contract_address {
        if actual != predicted {
            return Err(OrchestrateError::AddressDivergence {
                network: network.to_string(),
                predicted,
                actual,
            });
        }
    }

    let codehash = chain.get_codehash(predicted).await?;
    if codehash == Hash32::ZERO {
        return Err(OrchestrateError::DeployIncomplete(predicted));
    }
    if codehash != artifact.runtime_codehash {
        return Err(OrchestrateError::CodehashMismatch {
            expected: artifact.runtime_codehash,
            actual: codehash,
        });
    }

    info!(
        network,
        contract = artifact.contract_name,
        address = %predicted,
        tx_hash = %receipt.tx_hash,
        "Deployed."
    );
    Ok(DeployOutcome { artifact: record(Some(&receipt), codehash), deployed: true, warnings: vec![] })
}

/// Init code for a dispatcher deployment: the compiled init code with the
/// ABI-encoded `paused` constructor flag appended.
pub fn dispatcher_init_code(artifact: &CompiledArtifact, paused: bool) -> Bytes {
    let mut init_code = artifact.init_code.to_vec();
    let mut word = [0u8; 32];
    word[31] = paused as u8;
    init_code.extend_from_slice(&word);
    Bytes::from(init_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_flag_is_abi_encoded_word() {
        let artifact = CompiledArtifact {
            contract_name: "Dispatcher".into(),
            abi: vec![],
            init_code: Bytes::from_static(b"\x60\x80"),
            runtime_codehash: Hash32::repeat_byte(1),
        };

        let paused = dispatcher_init_code(&artifact, true);
        assert_eq!(paused.len(), 2 + 32);
        assert_eq!(paused[paused.len() - 1], 1);

        let unpaused = dispatcher_init_code(&artifact, false);
        assert_eq!(unpaused[unpaused.len() - 1], 0);
        // The flag is part of the init code, so it changes the predicted
        // address.
        assert_ne!(init_code_hash(&paused), init_code_hash(&unpaused));
    }
}
