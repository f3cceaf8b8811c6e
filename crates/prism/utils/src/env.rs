//! Environment variable access.
//!
//! These are the only variables the tool recognizes. Everything read here is
//! folded into the immutable run configuration before any work starts;
//! nothing else consults the process environment.

use alloy_signer_local::PrivateKeySigner;
use prism_types::{parse_salt, Hash32, FROZEN_FACTORY_SALT};
use thiserror::Error;
use url::Url;

pub const DEPLOYER_KEY_ENV: &str = "DEPLOYER_KEY";
pub const FROZEN_FACTORY_SALT_ENV: &str = "FROZEN_FACTORY_SALT";
pub const ACTIVATION_DELAY_ENV: &str = "ACTIVATION_DELAY_SECONDS";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("missing environment variable {0}")]
    Missing(String),
    #[error("invalid value in {var}: {detail}")]
    Invalid { var: String, detail: String },
}

/// The per-network RPC endpoint variable: `RPC_URL_<NETWORK>`, uppercased,
/// dashes mapped to underscores.
pub fn rpc_url_var(network: &str) -> String {
    format!("RPC_URL_{}", network.to_uppercase().replace('-', "_"))
}

pub fn rpc_url(network: &str) -> Result<Url, EnvError> {
    let var = rpc_url_var(network);
    let raw = std::env::var(&var).map_err(|_| EnvError::Missing(var.clone()))?;
    Url::parse(&raw).map_err(|e| EnvError::Invalid { var, detail: e.to_string() })
}

/// The deployer key. Required for anything that sends a transaction; dry
/// runs never call this.
pub fn deployer_key() -> Result<PrivateKeySigner, EnvError> {
    let raw = std::env::var(DEPLOYER_KEY_ENV)
        .map_err(|_| EnvError::Missing(DEPLOYER_KEY_ENV.into()))?;
    raw.trim_start_matches("0x")
        .parse()
        .map_err(|e: alloy_signer_local::LocalSignerError| EnvError::Invalid {
            var: DEPLOYER_KEY_ENV.into(),
            detail: e.to_string(),
        })
}

/// The factory salt: the operator override when set, otherwise the built-in
/// frozen constant.
pub fn frozen_salt() -> Result<Hash32, EnvError> {
    match std::env::var(FROZEN_FACTORY_SALT_ENV) {
        Ok(raw) => parse_salt(&raw).map_err(|e| EnvError::Invalid {
            var: FROZEN_FACTORY_SALT_ENV.into(),
            detail: e.to_string(),
        }),
        Err(_) => Ok(FROZEN_FACTORY_SALT),
    }
}

/// Operator override for the activation delay wait. When absent the delay is
/// read from the dispatcher contract at run time.
pub fn activation_delay_override() -> Result<Option<u64>, EnvError> {
    match std::env::var(ACTIVATION_DELAY_ENV) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| EnvError::Invalid {
                var: ACTIVATION_DELAY_ENV.into(),
                detail: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_var_normalizes_network_names() {
        assert_eq!(rpc_url_var("alpha"), "RPC_URL_ALPHA");
        assert_eq!(rpc_url_var("base-sepolia"), "RPC_URL_BASE_SEPOLIA");
    }

    #[test]
    fn frozen_salt_defaults_to_builtin() {
        std::env::remove_var(FROZEN_FACTORY_SALT_ENV);
        assert_eq!(frozen_salt().unwrap(), FROZEN_FACTORY_SALT);
    }
}
