#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod chain;
pub mod env;
pub mod http;
pub mod retry;

pub use chain::{ChainClient, ChainError, TxReceipt, TxRequest};
pub use http::{connect, HttpChain, CREATE2_DEPLOYER};
pub use retry::{with_retries, RetryPolicy, Retryable};

pub use alloy_signer_local::PrivateKeySigner;
