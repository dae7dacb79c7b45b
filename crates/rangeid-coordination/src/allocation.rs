//! Range-based id allocation over a shared consumption document.
//!
//! The consumption document for an allocation domain is a JSON array of the
//! ids already claimed. Claiming an id is an optimistic update of that array:
//! the candidate is chosen from the freshly read set, appended, and written
//! back conditionally. Losing the race re-reads and, if the candidate was
//! taken in the meantime, picks a new one.

use std::sync::Arc;

use rangeid_constants::allocation::DEFAULT_MAX_ALLOCATION_ATTEMPTS;
use rangeid_store::DocumentStore;
use tracing::debug;
use tracing::warn;

use crate::error::CoordinationError;
use crate::pure::ConsumptionPlan;
use crate::pure::find_first_available_id;
use crate::pure::normalize_ranges;
use crate::pure::plan_consumption;
use crate::pure::ranges_contain;
use crate::types::Allocation;
use crate::types::AllocationRequest;
use crate::types::ConsumedIds;
use crate::types::IdRange;
use crate::updater::OptimisticUpdater;
use crate::updater::Transform;
use crate::updater::UpdateOutcome;

/// State carried across attempts of one allocation.
#[derive(Debug, Default)]
struct AllocationProgress {
    /// Id chosen by the latest attempt that chose one.
    candidate: Option<u64>,
    /// Plan of the latest attempt.
    plan: Option<ConsumptionPlan>,
    /// Whether the latest read saw any consumed ids.
    had_prior: bool,
    /// Attempt budget hit.
    gave_up: bool,
}

/// Claims ids from ranges, recording them in per-domain documents.
pub struct ConsumptionCoordinator<S: DocumentStore + ?Sized> {
    updater: OptimisticUpdater<S>,
    max_attempts: u32,
}

impl<S: DocumentStore + ?Sized> ConsumptionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_updater(OptimisticUpdater::new(store), DEFAULT_MAX_ALLOCATION_ATTEMPTS)
    }

    pub fn with_updater(updater: OptimisticUpdater<S>, max_attempts: u32) -> Self {
        Self {
            updater,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Allocate an id from `ranges` in the document at `key`.
    ///
    /// Ranges are validated and sorted first; an invalid list fails with
    /// [`CoordinationError::InvalidRange`] before the store is touched. A
    /// required id outside every range fails with
    /// [`CoordinationError::IdOutOfRange`].
    ///
    /// Exhausted ranges are not an error: the result has `id == 0` and
    /// `available == false`. Running out of attempts under contention is
    /// [`CoordinationError::TooManyAttempts`].
    pub async fn allocate(
        &self,
        key: &str,
        ranges: &[IdRange],
        request: AllocationRequest,
    ) -> Result<Allocation, CoordinationError> {
        let ranges = normalize_ranges(ranges)?;
        if let Some(id) = request.required_id {
            if !ranges_contain(&ranges, id) {
                return Err(CoordinationError::IdOutOfRange { id });
            }
        }

        if !request.commit {
            return self.peek(key, &ranges, request.required_id).await;
        }

        let max_attempts = self.max_attempts;
        let mut progress = AllocationProgress::default();

        let outcome = self
            .updater
            .update(key, |consumed: Option<&ConsumedIds>, attempt| {
                if attempt >= max_attempts {
                    progress.gave_up = true;
                    return Ok(Transform::Unchanged);
                }
                progress.had_prior = consumed.is_some_and(|ids| !ids.is_empty());

                let plan =
                    plan_consumption(&ranges, consumed.map(Vec::as_slice), progress.candidate, request.required_id);
                let transform = match &plan {
                    ConsumptionPlan::Claim { id, consumed } => {
                        progress.candidate = Some(*id);
                        Transform::Replace(consumed.clone())
                    }
                    ConsumptionPlan::AlreadyConsumed { .. } | ConsumptionPlan::Exhausted => Transform::Unchanged,
                };
                progress.plan = Some(plan);
                Ok(transform)
            })
            .await?;

        if progress.gave_up {
            warn!(key, attempts = max_attempts, "allocation gave up under contention");
            return Err(CoordinationError::TooManyAttempts {
                key: key.to_string(),
                attempts: max_attempts,
            });
        }

        let allocation = match (outcome, progress.plan) {
            (UpdateOutcome::Written { attempts, .. }, Some(ConsumptionPlan::Claim { id, .. })) => {
                debug!(key, id, attempts, "id allocated");
                Allocation {
                    id,
                    available: true,
                    updated: true,
                    was_already_consumed: false,
                    has_prior_consumption: progress.had_prior,
                }
            }
            (_, Some(ConsumptionPlan::AlreadyConsumed { id })) => {
                debug!(key, id, "required id already consumed");
                Allocation {
                    id,
                    available: false,
                    updated: false,
                    was_already_consumed: true,
                    has_prior_consumption: progress.had_prior,
                }
            }
            (_, plan) => {
                debug!(key, ?plan, "no id available in ranges");
                Allocation {
                    id: 0,
                    available: false,
                    updated: false,
                    was_already_consumed: false,
                    has_prior_consumption: progress.had_prior,
                }
            }
        };
        Ok(allocation)
    }

    /// Report what an allocation would return without writing.
    async fn peek(
        &self,
        key: &str,
        ranges: &[IdRange],
        required_id: Option<u64>,
    ) -> Result<Allocation, CoordinationError> {
        let consumed: ConsumedIds = self.updater.read(key).await?.unwrap_or_default();
        let has_prior_consumption = !consumed.is_empty();

        let (id, available) = match required_id {
            Some(id) => (id, !consumed.contains(&id)),
            None => {
                let id = find_first_available_id(ranges, &consumed);
                (id, id != 0)
            }
        };

        Ok(Allocation {
            id,
            available,
            updated: false,
            was_already_consumed: required_id.is_some() && !available,
            has_prior_consumption,
        })
    }
}
