//! Executes rotation plans.
//!
//! Credentials are independent: they run concurrently up to a bound, and one
//! credential's failure never stops the others. Within a credential the
//! secondary pushes also run independently so an outage at one store does
//! not block the rest.

use envseal_core::config::{Environment, RotationConfig};
use envseal_core::{ExitStatus, SecretString};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::credential::StoreKind;
use crate::error::{Result, RotationError};
use crate::plan::{PlannedPush, PlannedRotation, RotationPlan};
use crate::retry::RetryPolicy;
use crate::state::RotationState;
use crate::stores::{AuthoritativeStore, SecondaryStore, StoreSet};

/// Operator approval before any mutating call.
pub trait Confirm: Send + Sync {
    fn confirm(&self, plan: &RotationPlan) -> bool;
}

/// Approves everything (`--yes`, `ENVSEAL_AUTO_APPROVE`).
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn confirm(&self, _plan: &RotationPlan) -> bool {
        true
    }
}

/// Result of one secondary push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub store: StoreKind,
    pub secret_name: String,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state of one credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialReport {
    pub credential: String,
    pub state: RotationState,
    pub stores: Vec<StoreOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Per-credential results of a rotation run.
#[derive(Debug, Clone, Serialize)]
pub struct RotationSummary {
    pub environment: Environment,
    pub reports: Vec<CredentialReport>,
}

impl RotationSummary {
    pub fn count(&self, state: RotationState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    pub fn all_done(&self) -> bool {
        self.reports.iter().all(|r| r.state == RotationState::Done)
    }

    /// Success only when every credential reached `Done`.
    pub fn exit_status(&self) -> ExitStatus {
        if self.all_done() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    /// Surface partial propagation (first) or failures as an error.
    pub fn ensure_complete(&self) -> Result<()> {
        let names = |state| -> Vec<String> {
            self.reports
                .iter()
                .filter(|r| r.state == state)
                .map(|r| r.credential.clone())
                .collect()
        };
        let partial = names(RotationState::PartiallyPropagated);
        if !partial.is_empty() {
            return Err(RotationError::PartialPropagation {
                credentials: partial,
            });
        }
        let failed = names(RotationState::Failed);
        if !failed.is_empty() {
            return Err(RotationError::Failed {
                credentials: failed,
            });
        }
        Ok(())
    }
}

pub struct Orchestrator {
    authoritative: Arc<dyn AuthoritativeStore>,
    secondaries: Vec<Arc<dyn SecondaryStore>>,
    concurrency: usize,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        authoritative: Arc<dyn AuthoritativeStore>,
        secondaries: Vec<Arc<dyn SecondaryStore>>,
    ) -> Self {
        let defaults = RotationConfig::default();
        Self {
            authoritative,
            secondaries,
            concurrency: defaults.concurrency,
            call_timeout: Duration::from_secs(defaults.timeout_secs),
            retry: RetryPolicy::from(&defaults.retry),
        }
    }

    pub fn from_config(stores: StoreSet, config: &RotationConfig) -> Self {
        Self::new(stores.authoritative, stores.secondaries)
            .with_concurrency(config.concurrency)
            .with_call_timeout(Duration::from_secs(config.timeout_secs))
            .with_retry(RetryPolicy::from(&config.retry))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Bound on each individual store call (per attempt).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute `plan` after confirmation.
    ///
    /// Returns a summary even when credentials fail; use
    /// [`RotationSummary::ensure_complete`] to turn that into an error.
    pub async fn execute(&self, plan: &RotationPlan, confirm: &dyn Confirm) -> Result<RotationSummary> {
        if !confirm.confirm(plan) {
            return Err(RotationError::NotConfirmed);
        }

        info!(
            environment = %plan.environment,
            credentials = plan.rotations.len(),
            concurrency = self.concurrency,
            "starting rotation"
        );

        let mut reports: Vec<CredentialReport> = stream::iter(&plan.rotations)
            .map(|rotation| self.rotate(rotation))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        reports.sort_by(|a, b| a.credential.cmp(&b.credential));

        let summary = RotationSummary {
            environment: plan.environment,
            reports,
        };
        info!(
            done = summary.count(RotationState::Done),
            partial = summary.count(RotationState::PartiallyPropagated),
            failed = summary.count(RotationState::Failed),
            "rotation finished"
        );
        Ok(summary)
    }

    async fn rotate(&self, rotation: &PlannedRotation) -> CredentialReport {
        let started = Instant::now();
        let name = rotation.credential.name.clone();
        let mut report = CredentialReport {
            credential: name.clone(),
            state: RotationState::Idle,
            stores: Vec::new(),
            error: None,
            duration_ms: 0,
        };

        self.advance(&mut report, RotationState::RotatingAuthoritative);
        let value = match self.rotate_authoritative(rotation).await {
            Ok(value) => value,
            Err(e) => {
                error!(credential = %name, store = %self.authoritative.kind(), error = %e, "authoritative rotation failed");
                report.error = Some(e.to_string());
                self.advance(&mut report, RotationState::Failed);
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };
        info!(
            credential = %name,
            client_id = %rotation.credential.client_id,
            invalidation = %rotation.credential.invalidation,
            "authoritative secret regenerated"
        );

        self.advance(&mut report, RotationState::PropagatingSecondary);
        report.stores = futures::future::join_all(
            rotation
                .pushes
                .iter()
                .map(|push| self.propagate(&name, push, &value)),
        )
        .await;

        let failed: Vec<String> = report
            .stores
            .iter()
            .filter(|o| !o.confirmed)
            .map(|o| o.store.to_string())
            .collect();
        if failed.is_empty() {
            self.advance(&mut report, RotationState::Done);
        } else {
            report.error = Some(format!("not confirmed by: {}", failed.join(", ")));
            self.advance(&mut report, RotationState::PartiallyPropagated);
            error!(credential = %name, stores = %failed.join(","), "credential partially propagated; stores disagree");
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Regenerate, then read back so the value propagated is the one the
    /// authoritative store holds.
    async fn rotate_authoritative(&self, rotation: &PlannedRotation) -> Result<SecretString> {
        let client_id = rotation.credential.client_id.as_str();
        let store = self.authoritative.kind();

        let issued = self
            .call(store, "regenerate", || self.authoritative.regenerate(client_id))
            .await?;

        match self.call(store, "read", || self.authoritative.read(client_id)).await {
            Ok(current) if current == issued => Ok(issued),
            Ok(current) => {
                warn!(client_id, "read-back differs from regenerated value; propagating current value");
                Ok(current)
            }
            Err(e) => {
                warn!(client_id, error = %e, "read-back failed; propagating regenerated value");
                Ok(issued)
            }
        }
    }

    async fn propagate(&self, credential: &str, push: &PlannedPush, value: &SecretString) -> StoreOutcome {
        let result = match self.secondaries.iter().find(|s| s.kind() == push.store) {
            Some(store) => {
                self.call(push.store, "push", || store.push(&push.secret_name, value))
                    .await
            }
            None => Err(RotationError::config(format!("{} store is not available", push.store))),
        };

        match result {
            Ok(()) => {
                info!(credential, store = %push.store, secret = %push.secret_name, "secondary store updated");
                StoreOutcome {
                    store: push.store,
                    secret_name: push.secret_name.clone(),
                    confirmed: true,
                    error: None,
                }
            }
            Err(e) => {
                error!(credential, store = %push.store, secret = %push.secret_name, error = %e, "secondary store update failed");
                StoreOutcome {
                    store: push.store,
                    secret_name: push.secret_name.clone(),
                    confirmed: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// One store call with a per-attempt timeout and retry.
    async fn call<T, F, Fut>(&self, store: StoreKind, operation: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.call_timeout;
        self.retry
            .run(store, operation, || {
                let attempt = op();
                async move {
                    tokio::time::timeout(timeout, attempt)
                        .await
                        .unwrap_or(Err(RotationError::Timeout {
                            store,
                            after: timeout,
                        }))
                }
            })
            .await
    }

    fn advance(&self, report: &mut CredentialReport, next: RotationState) {
        match report.state.transition(next) {
            Ok(state) => report.state = state,
            // Transitions are driven by the code above; a rejection is a bug.
            Err(e) => {
                error!(credential = %report.credential, error = %e, "state machine violation");
                report.state = RotationState::Failed;
            }
        }
    }
}
