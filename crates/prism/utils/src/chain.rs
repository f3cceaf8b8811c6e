//! The chain client seam.
//!
//! Everything the pipeline asks of a chain goes through [`ChainClient`], so
//! the same core runs against a JSON-RPC endpoint or an in-memory chain.
//! The client performs no retries of its own; retry policy belongs to the
//! orchestrator.

use async_trait::async_trait;
use prism_types::{codehash, Address, Bytes, Hash32, U256};
use thiserror::Error;

use crate::retry::Retryable;

/// A transaction to send. `to == None` is a contract creation; a creation
/// carrying a `salt` is deterministic (CREATE2) and its address is derivable
/// before sending.
#[derive(Clone, Debug, Default)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub salt: Option<Hash32>,
    pub gas: Option<u64>,
}

impl TxRequest {
    pub fn call(to: Address, data: Bytes) -> Self {
        Self { to: Some(to), data, ..Default::default() }
    }

    /// A deterministic creation of `init_code` under `salt`.
    pub fn create2(salt: Hash32, init_code: Bytes) -> Self {
        Self { to: None, data: init_code, salt: Some(salt), ..Default::default() }
    }
}

/// The subset of a receipt the pipeline consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: Hash32,
    pub block_number: Option<u64>,
    /// Populated for creations when the chain reports the created address.
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub success: bool,
}

/// Chain client errors come in exactly three kinds. Only `Transport` is
/// retryable; `Revert` is a definitive on-chain answer and `Decode` is a
/// programming error.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("execution reverted ({} bytes of return data)", .0.len())]
    Revert(Bytes),
    #[error("decode: {0}")]
    Decode(String),
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Thin abstraction over an EVM JSON-RPC client.
///
/// Implementations hold no long-lived state besides the connection itself.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Runtime code at `address`; empty bytes for an EOA or empty account.
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError>;

    /// `keccak256` of the runtime code, zero for an empty account. Derived
    /// from [`get_code`](Self::get_code) when the RPC has no direct method.
    async fn get_codehash(&self, address: Address) -> Result<Hash32, ChainError> {
        let code = self.get_code(address).await?;
        Ok(codehash(&code))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> Result<u64, ChainError>;

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// Sends `tx` and waits for `confirmations` confirmations.
    async fn send_and_wait(
        &self,
        tx: TxRequest,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// The account that signs and pays for transactions.
    fn deployer_address(&self) -> Address;

    /// The address that performs salted creations for this client; the
    /// `deployer` operand of the CREATE2 address formula.
    fn create2_deployer(&self) -> Address;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(ChainError::Transport("503".into()).is_retryable());
        assert!(!ChainError::Revert(Bytes::new()).is_retryable());
        assert!(!ChainError::Decode("bad length".into()).is_retryable());
    }

    #[test]
    fn create2_request_has_no_recipient() {
        let tx = TxRequest::create2(Hash32::ZERO, Bytes::from_static(b"\xfe"));
        assert!(tx.to.is_none());
        assert_eq!(tx.salt, Some(Hash32::ZERO));
    }
}
