#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod hash;
pub mod salt;

pub use hash::*;
pub use salt::*;

// Re-exported so downstream crates agree on a single set of primitive types.
pub use alloy_primitives::{address, b256, keccak256, Address, Bytes, FixedBytes, B256, U256};

/// A 32-byte hash value.
pub type Hash32 = B256;

/// A 4-byte function selector.
pub type Selector = FixedBytes<4>;

/// The EVM runtime code size limit (EIP-170), in bytes.
///
/// Facet runtime code and factory init code are both bounded by this limit
/// before any deployment transaction is sent.
pub const MAX_CONTRACT_SIZE: usize = 24_576;
