//! On-chain interfaces the pipeline drives.
//!
//! Declared ahead of time with `sol!`; the driver never discovers methods at
//! run time beyond choosing between the two pending-state shapes.

use alloy_sol_types::sol;

sol! {
    /// The dispatcher's staged-root protocol. `pending()` and the three
    /// individual getters are alternative shapes; a deployment exposes at
    /// least one of them.
    interface IDispatcher {
        function commitRoot(bytes32 root, uint64 epoch) external;
        function applyRoutes(
            bytes4[] calldata selectors,
            address[] calldata facets,
            bytes32[] calldata codehashes,
            bytes32[][] calldata proofs,
            bool[][] calldata isRight
        ) external;
        function activateCommittedRoot() external;

        function activeRoot() external view returns (bytes32);
        function activeEpoch() external view returns (uint64);
        function pending() external view returns (bytes32 root, uint64 epoch, uint64 earliestActivation);
        function pendingRoot() external view returns (bytes32);
        function pendingEpoch() external view returns (uint64);
        function earliestActivation() external view returns (uint64);
        function activationDelay() external view returns (uint64);
        function paused() external view returns (bool);
    }

    interface IFactory {
        function owner() external view returns (address);
    }
}
