#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod abi;
pub mod config;
pub mod dispatcher;
pub mod factory;
pub mod orchestrate;
pub mod preflight;
pub mod report;
pub mod smoke;

pub use config::{RunConfig, DISPATCHER_CONTRACT, FACTORY_CONTRACT};
pub use dispatcher::{
    ActivationOutcome, CommitOutcome, DispatcherDriver, DriverError, PendingShape, RouteBatch,
    StagedRoot,
};
pub use orchestrate::{OrchestrateError, Orchestrator};
pub use preflight::{CheckOutcome, Preflight, PreflightError, PreflightReport};
pub use report::{ErrorRecord, NetworkOutcome, NetworkStatus, OrchestrationReport, RunStatus};
