//! Credential rotation orchestration.
//!
//! A logical credential is regenerated at its authoritative store (the
//! identity provider) and the new value is pushed to every configured
//! secondary store. Stores are independent systems of record with no shared
//! transaction, so each credential runs an explicit state machine and a
//! failed secondary push ends in [`RotationState::PartiallyPropagated`]
//! rather than being rolled back or ignored.

pub mod credential;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod retry;
pub mod state;
pub mod stores;

mod http;

pub use credential::{LogicalCredential, StoreKind};
pub use error::{Result, RotationError};
pub use orchestrator::{
    AutoApprove, Confirm, CredentialReport, Orchestrator, RotationSummary, StoreOutcome,
};
pub use plan::{PlannedPush, PlannedRotation, RotationPlan, Selection};
pub use retry::RetryPolicy;
pub use state::RotationState;
pub use stores::{AuthoritativeStore, SecondaryStore, StoreSecrets, StoreSet};
