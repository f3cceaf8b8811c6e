//! The machine-readable orchestration report.

use chrono::{DateTime, Utc};
use prism_types::{Address, Hash32};
use serde::{Deserialize, Serialize};

use crate::preflight::CheckOutcome;
use crate::smoke::SmokeOutcome;

/// One typed error, flattened for the report: the variant name and its
/// rendered message. Nothing is swallowed; every error a network hit is
/// recorded in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: impl Into<String>, error: &impl std::fmt::Display) -> Self {
        Self { kind: kind.into(), message: error.to_string() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Partial,
    Abort,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Abort => "ABORT",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkStatus {
    Success,
    Failed,
    /// The run aborted before this network was attempted.
    Skipped,
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NetworkStatus::Success => "SUCCESS",
            NetworkStatus::Failed => "FAILED",
            NetworkStatus::Skipped => "SKIPPED",
        };
        f.write_str(name)
    }
}

/// Per-network result of one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkOutcome {
    pub network: String,
    pub status: NetworkStatus,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<String>,
    pub factory_address: Option<Address>,
    pub dispatcher_address: Option<Address>,
    pub committed_root: Option<Hash32>,
    /// The dispatcher's effective epoch after the run.
    pub effective_epoch: Option<u64>,
    /// Chain timestamp at which the committed root became active.
    pub activated_at: Option<u64>,
    pub smoke: Option<SmokeOutcome>,
}

impl NetworkOutcome {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            status: NetworkStatus::Skipped,
            errors: vec![],
            warnings: vec![],
            factory_address: None,
            dispatcher_address: None,
            committed_root: None,
            effective_epoch: None,
            activated_at: None,
            smoke: None,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, NetworkStatus::Failed)
    }
}

/// The single report emitted at the end of every run, dry or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub status: RunStatus,
    pub manifest_root: Option<Hash32>,
    pub target_epoch: Option<u64>,
    /// Run-level failures that aborted the pipeline before or between
    /// per-network stages.
    pub run_errors: Vec<ErrorRecord>,
    /// Outcomes of every preflight check that ran.
    pub preflight: Vec<CheckOutcome>,
    pub networks: Vec<NetworkOutcome>,
}

impl OrchestrationReport {
    /// Report file name under `reports/`, keyed by the run's start time.
    pub fn file_name(&self) -> String {
        format!("orchestration-{}.json", self.started_at.timestamp())
    }

    /// Derives the aggregate status from per-network outcomes. An abort
    /// stays an abort regardless of outcomes.
    pub fn finalize(&mut self) {
        if self.status == RunStatus::Abort {
            return;
        }
        self.status = if self.networks.iter().any(NetworkOutcome::failed) {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
    }
}
