//! [`ChainClient`] over an alloy HTTP provider.

use std::time::Duration;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockNumberOrTag, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::{RpcError, TransportErrorKind};
use alloy_transport_http::{Client, Http};
use async_trait::async_trait;
use prism_types::{address, Address, Bytes, U256};
use tracing::trace;
use url::Url;

use crate::chain::{ChainClient, ChainError, TxReceipt, TxRequest};

/// The canonical deterministic-deployment proxy, present at the same address
/// on every supported chain. Salted creations are routed through it: the
/// calldata is `salt[32] || init_code` and the proxy performs the CREATE2,
/// making it the `deployer` operand of the address formula.
pub const CREATE2_DEPLOYER: Address = address!("4e59b44847b379578588920cA78FbF26c0B4956C");

/// A JSON-RPC chain client with a per-call timeout on every request.
#[derive(Debug)]
pub struct HttpChain<P> {
    provider: P,
    deployer: Address,
    timeout: Duration,
}

/// Connects to `rpc_url` with the given deployer key.
pub fn connect(
    rpc_url: Url,
    signer: PrivateKeySigner,
    timeout: Duration,
) -> HttpChain<impl Provider<Http<Client>> + Clone> {
    let deployer = signer.address();
    let wallet = EthereumWallet::from(signer);
    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(wallet)
        .on_http(rpc_url);

    trace!(%deployer, "Connected HTTP chain client.");
    HttpChain { provider, deployer, timeout }
}

impl<P> HttpChain<P> {
    pub fn new(provider: P, deployer: Address, timeout: Duration) -> Self {
        Self { provider, deployer, timeout }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: std::future::IntoFuture<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(classify_rpc_error),
            Err(_) => Err(ChainError::Transport(format!(
                "rpc call exceeded {}s timeout",
                self.timeout.as_secs()
            ))),
        }
    }

    fn build_request(&self, tx: &TxRequest) -> TransactionRequest {
        let mut request = TransactionRequest::default().with_value(tx.value);
        match (tx.to, tx.salt) {
            (Some(to), _) => {
                request = request.with_to(to).with_input(tx.data.clone());
            }
            (None, Some(salt)) => {
                // Deterministic creation through the proxy: salt-prefixed
                // init code, sent as an ordinary call.
                let mut data = Vec::with_capacity(32 + tx.data.len());
                data.extend_from_slice(salt.as_slice());
                data.extend_from_slice(&tx.data);
                request = request.with_to(CREATE2_DEPLOYER).with_input(Bytes::from(data));
            }
            (None, None) => {
                request = request.with_deploy_code(tx.data.clone());
            }
        }
        if let Some(gas) = tx.gas {
            request = request.with_gas_limit(gas as _);
        }
        request
    }
}

#[async_trait]
impl<P> ChainClient for HttpChain<P>
where
    P: Provider<Http<Client>> + Send + Sync,
{
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        self.timed(self.provider.get_code_at(address)).await
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.timed(self.provider.get_balance(address)).await
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.timed(self.provider.get_chain_id()).await
    }

    async fn block_timestamp(&self) -> Result<u64, ChainError> {
        let block = self
            .timed(self.provider.get_block_by_number(BlockNumberOrTag::Latest, false))
            .await?
            .ok_or_else(|| ChainError::Transport("no latest block".into()))?;
        Ok(block.header.timestamp)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, ChainError> {
        let request = self.build_request(tx);
        let estimate = self.timed(self.provider.estimate_gas(&request)).await?;
        Ok(u64::try_from(estimate).unwrap_or(u64::MAX))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        let price = self.timed(self.provider.get_gas_price()).await?;
        Ok(U256::from(price))
    }

    async fn send_and_wait(
        &self,
        tx: TxRequest,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        let request = self.build_request(&tx);
        let pending = self
            .timed(self.provider.send_transaction(request))
            .await?;

        let tx_hash = *pending.tx_hash();
        trace!(%tx_hash, confirmations, "Transaction sent, waiting for receipt.");

        let receipt = pending
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let receipt = TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
            success: receipt.status(),
        };

        if !receipt.success {
            // The receipt carries no return data; the revert reason, if any,
            // is recoverable only by re-simulating the call.
            return Err(ChainError::Revert(Bytes::new()));
        }
        Ok(receipt)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        self.timed(self.provider.call(&request)).await
    }

    fn deployer_address(&self) -> Address {
        self.deployer
    }

    fn create2_deployer(&self) -> Address {
        CREATE2_DEPLOYER
    }
}

fn classify_rpc_error(error: RpcError<TransportErrorKind>) -> ChainError {
    if let Some(payload) = error.as_error_resp() {
        if let Some(revert_data) = payload.as_revert_data() {
            return ChainError::Revert(revert_data);
        }
        return ChainError::Transport(payload.to_string());
    }
    match error {
        RpcError::DeserError { .. } => ChainError::Decode(error.to_string()),
        other => ChainError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use prism_types::Hash32;

    use super::*;

    #[test]
    fn salted_creation_routes_through_the_proxy() {
        let chain = HttpChain::new((), Address::repeat_byte(1), Duration::from_secs(30));
        let tx = TxRequest::create2(Hash32::repeat_byte(0xaa), Bytes::from_static(b"\x60\x80"));

        let request = chain.build_request(&tx);
        assert_eq!(request.to.and_then(|kind| kind.to().copied()), Some(CREATE2_DEPLOYER));

        let input = request.input.input().unwrap();
        assert_eq!(&input[..32], Hash32::repeat_byte(0xaa).as_slice());
        assert_eq!(&input[32..], b"\x60\x80");
    }

    #[test]
    fn plain_call_keeps_recipient() {
        let chain = HttpChain::new((), Address::repeat_byte(1), Duration::from_secs(30));
        let to = Address::repeat_byte(0xdd);
        let request = chain.build_request(&TxRequest::call(to, Bytes::from_static(b"\x01")));
        assert_eq!(request.to.and_then(|kind| kind.to().copied()), Some(to));
    }
}
