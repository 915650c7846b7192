//! Bulk execution with per-item fallback.
//!
//! [`FallbackCoordinator`] tries the bulk endpoint first. If the whole
//! submission fails it resubmits every input individually, with at most
//! `max_concurrent_requests` in flight, and records each input's fate. The
//! resulting [`BulkOutcome`] is always ordered by the inputs' positions,
//! never by completion order.

use std::collections::BTreeSet;

use futures::StreamExt;
use text2everything_types::{
    DataIntegrityWarning, LogicalInput, OneOrMany, PhysicalRecord, ResourceKind, ServerRecord,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{BulkConfig, BulkStrategy},
    error::{Result, SdkError},
    group_index::SplitGroupIndex,
    normalize::{Normalized, normalize_entry},
    submitter::{ItemSubmitter, check_inputs},
};

/// Path a bulk call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkMode {
    /// The bulk endpoint accepted the submission.
    Bulk,
    /// The bulk endpoint failed; inputs were submitted one by one.
    FallbackPerItem,
    /// Inputs were submitted one by one by configuration.
    PerItem,
}

/// An input that produced no records.
#[derive(Debug)]
pub struct FailedInput {
    /// Position of the input.
    pub sequence_index: usize,
    /// Short label of the payload (name or question).
    pub label: String,
    /// Why it failed.
    pub error: SdkError,
}

/// Result of a bulk create.
#[derive(Debug)]
pub struct BulkOutcome {
    /// Created records ordered by origin position, split parts by index.
    pub results: Vec<PhysicalRecord>,
    /// Inputs that failed, ordered by position.
    pub failed_inputs: Vec<FailedInput>,
    /// Path the call took.
    pub mode_used: BulkMode,
    /// Every integrity warning raised while normalizing.
    pub warnings: Vec<DataIntegrityWarning>,
    /// Number of inputs submitted.
    pub input_count: usize,
}

impl BulkOutcome {
    /// Returns true if every input produced records.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed_inputs.is_empty()
    }

    /// Number of inputs that produced records.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.origin_sequence_index)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Positions of the failed inputs.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed_inputs.iter().map(|f| f.sequence_index).collect()
    }

    /// Records created from the input at `sequence_index`.
    #[must_use]
    pub fn records_for(&self, sequence_index: usize) -> Vec<&PhysicalRecord> {
        self.results.iter().filter(|r| r.origin_sequence_index == Some(sequence_index)).collect()
    }

    /// Builds a split group index over the results.
    #[must_use]
    pub fn group_index(&self) -> SplitGroupIndex<'_> {
        SplitGroupIndex::build(&self.results)
    }

    /// Returns the records if every input succeeded.
    ///
    /// # Errors
    ///
    /// Hands the outcome back unchanged if any input failed.
    pub fn into_result(self) -> std::result::Result<Vec<PhysicalRecord>, BulkOutcome> {
        if self.is_complete_success() { Ok(self.results) } else { Err(self) }
    }
}

/// Runs bulk creates with per-item fallback.
#[derive(Debug, Clone)]
pub struct FallbackCoordinator {
    submitter: ItemSubmitter,
    config: BulkConfig,
}

impl FallbackCoordinator {
    /// Creates a coordinator.
    pub fn new(submitter: ItemSubmitter, config: BulkConfig) -> Self {
        Self { submitter, config }
    }

    /// Returns the bulk settings in use.
    #[must_use]
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Creates every input.
    ///
    /// Per-input failures are reported in [`BulkOutcome::failed_inputs`]. That
    /// includes inputs the bulk response had no usable entry for: they fail
    /// with [`SdkError::ResponseShape`] and are never resubmitted, since the
    /// server may already have created them. Entries that could be aligned
    /// are kept.
    ///
    /// # Errors
    ///
    /// Only for programmer errors, before any call:
    /// [`SdkError::EmptyInput`] or [`SdkError::ResourceKindMismatch`].
    /// [`SdkError::Cancelled`] if the client was shut down before the bulk
    /// call.
    pub async fn execute(&self, inputs: &[LogicalInput], kind: ResourceKind) -> Result<BulkOutcome> {
        self.execute_with_cancellation(inputs, kind, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), but stops dispatching per-item
    /// requests once `cancel` fires.
    ///
    /// In-flight requests complete and their results are kept. Inputs not yet
    /// dispatched are reported as failed with [`SdkError::Cancelled`].
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_cancellation(
        &self,
        inputs: &[LogicalInput],
        kind: ResourceKind,
        cancel: &CancellationToken,
    ) -> Result<BulkOutcome> {
        check_inputs(inputs, kind)?;

        let (valid, mut failed) = self.validate_locally(inputs);

        let (normalized, mode_used) = if valid.is_empty() {
            debug!(kind = %kind, "no input passed validation; nothing to submit");
            (Normalized::default(), self.default_mode())
        } else {
            match self.config.strategy {
                BulkStrategy::BulkEndpoint => match self.submitter.submit_bulk(&valid, kind).await {
                    Ok(entries) => {
                        let (normalized, unaligned) = settle(&valid, entries);
                        if !unaligned.is_empty() {
                            warn!(
                                kind = %kind,
                                unaligned = unaligned.len(),
                                "bulk response could not be aligned for some inputs"
                            );
                        }
                        failed.extend(unaligned);
                        (normalized, BulkMode::Bulk)
                    },
                    Err(err @ SdkError::BulkSubmissionFailed { .. }) => {
                        warn!(
                            kind = %kind,
                            count = valid.len(),
                            error = %err,
                            "bulk submission failed; falling back to per-item"
                        );
                        let (normalized, item_failures) =
                            self.submit_each(&valid, kind, cancel).await;
                        failed.extend(item_failures);
                        (normalized, BulkMode::FallbackPerItem)
                    },
                    Err(err) => return Err(err),
                },
                BulkStrategy::PerItem => {
                    let (normalized, item_failures) = self.submit_each(&valid, kind, cancel).await;
                    failed.extend(item_failures);
                    (normalized, BulkMode::PerItem)
                },
            }
        };

        failed.sort_by_key(|f| f.sequence_index);
        let outcome = BulkOutcome {
            results: normalized.records,
            failed_inputs: failed,
            mode_used,
            warnings: normalized.warnings,
            input_count: inputs.len(),
        };

        info!(
            kind = %kind,
            mode = ?outcome.mode_used,
            inputs = outcome.input_count,
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_inputs.len(),
            records = outcome.results.len(),
            warnings = outcome.warnings.len(),
            "bulk create finished"
        );
        Ok(outcome)
    }

    fn default_mode(&self) -> BulkMode {
        match self.config.strategy {
            BulkStrategy::BulkEndpoint => BulkMode::Bulk,
            BulkStrategy::PerItem => BulkMode::PerItem,
        }
    }

    /// Splits inputs into those passing local validation and failures.
    fn validate_locally(&self, inputs: &[LogicalInput]) -> (Vec<LogicalInput>, Vec<FailedInput>) {
        if !self.config.validate {
            return (inputs.to_vec(), Vec::new());
        }

        let mut valid = Vec::with_capacity(inputs.len());
        let mut failed = Vec::new();
        for input in inputs {
            match input.payload.validate() {
                Ok(()) => valid.push(input.clone()),
                Err(source) => {
                    debug!(
                        sequence_index = input.sequence_index,
                        error = %source,
                        "input failed local validation"
                    );
                    failed.push(FailedInput {
                        sequence_index: input.sequence_index,
                        label: input.payload.label().to_owned(),
                        error: SdkError::Model { source },
                    });
                },
            }
        }
        (valid, failed)
    }

    /// Submits each input individually, bounded by `max_concurrent_requests`.
    async fn submit_each(
        &self,
        inputs: &[LogicalInput],
        kind: ResourceKind,
        cancel: &CancellationToken,
    ) -> (Normalized, Vec<FailedInput>) {
        let stopped = || cancel.is_cancelled() || self.submitter.is_shut_down();

        let mut slots: Vec<Option<Result<OneOrMany<ServerRecord>>>> =
            std::iter::repeat_with(|| None).take(inputs.len()).collect();

        let mut start = 0;
        if self.config.warm_first_item && inputs.len() > 1 && !stopped() {
            slots[0] = Some(self.submitter.submit_single(&inputs[0], kind).await);
            start = 1;
        }

        let limit = self.config.max_concurrent_requests.max(1);
        let mut responses = futures::stream::iter(start..inputs.len())
            .map(|position| async move {
                if stopped() {
                    return (position, Err(SdkError::Cancelled));
                }
                (position, self.submitter.submit_single(&inputs[position], kind).await)
            })
            .buffer_unordered(limit);

        while let Some((position, response)) = responses.next().await {
            slots[position] = Some(response);
        }

        let slots =
            slots.into_iter().map(|slot| slot.unwrap_or_else(|| Err(SdkError::Cancelled))).collect();
        settle(inputs, slots)
    }
}

/// Normalizes each input's response slot, in input order.
///
/// `slots` holds one response or error per input.
fn settle(
    inputs: &[LogicalInput],
    slots: Vec<Result<OneOrMany<ServerRecord>>>,
) -> (Normalized, Vec<FailedInput>) {
    let mut normalized = Normalized::default();
    let mut failed = Vec::new();
    for (input, slot) in inputs.iter().zip(slots) {
        match slot.and_then(|entry| normalize_entry(entry, input.sequence_index)) {
            Ok(records) => normalized.extend(records),
            Err(error) => {
                debug!(
                    sequence_index = input.sequence_index,
                    label = input.payload.label(),
                    error_type = error.error_type(),
                    error = %error,
                    "item failed"
                );
                failed.push(FailedInput {
                    sequence_index: input.sequence_index,
                    label: input.payload.label().to_owned(),
                    error,
                });
            },
        }
    }
    (normalized, failed)
}
