//! Deterministic hashing and address derivation.
//!
//! Everything in this module is a pure function over bytes. Byte order in
//! every keccak input is the explicit big-endian concatenation documented on
//! each function, so results are identical on every host.

use alloy_primitives::{keccak256, Address};

use crate::{Hash32, Selector};

/// Computes the CREATE2 address for a deployment.
///
/// `addr = last_20_bytes( keccak256( 0xff || deployer[20] || salt[32] || init_code_hash[32] ) )`
pub fn create2_address(deployer: Address, salt: Hash32, init_code_hash: Hash32) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer.as_slice());
    preimage[21..53].copy_from_slice(salt.as_slice());
    preimage[53..85].copy_from_slice(init_code_hash.as_slice());

    Address::from_slice(&keccak256(preimage)[12..])
}

/// Computes the 4-byte selector of a canonical function signature.
///
/// The signature must already be canonical: parameter names omitted, no
/// whitespace, tuples flattened (e.g. `transfer(address,uint256)`).
pub fn selector(canonical_signature: &str) -> Selector {
    Selector::from_slice(&keccak256(canonical_signature.as_bytes())[..4])
}

/// Hash of the full init code (constructor bytecode plus ABI-encoded
/// constructor arguments), as consumed by [`create2_address`].
pub fn init_code_hash(init_code: &[u8]) -> Hash32 {
    keccak256(init_code)
}

/// Codehash of runtime bytecode as the chain reports it: zero for an empty
/// account, `keccak256(code)` otherwise.
pub fn codehash(runtime_code: &[u8]) -> Hash32 {
    if runtime_code.is_empty() {
        Hash32::ZERO
    } else {
        keccak256(runtime_code)
    }
}
