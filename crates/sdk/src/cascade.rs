//! Split-aware deletion.
//!
//! Deleting one part of a split record deletes every part of its group.
//! The cascade is orchestrated by the client, one delete per part, and is
//! not atomic: each part's fate is reported in the [`DeletionResult`].

use text2everything_types::{PhysicalRecord, ResourceKind};
use tracing::{debug, warn};

use crate::{
    error::{Result, SdkError},
    group_index::SplitGroupIndex,
    submitter::{DEFAULT_PAGE_SIZE, ItemSubmitter},
};

/// What happened to one record during a delete.
#[derive(Debug)]
pub enum DeletionStatus {
    /// The delete succeeded.
    Deleted,
    /// The record was already gone (HTTP 404).
    AlreadyAbsent,
    /// The delete failed.
    Failed(SdkError),
}

impl DeletionStatus {
    /// Returns true unless the delete failed.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Outcome for one record id.
#[derive(Debug)]
pub struct DeletionOutcome {
    /// Record the delete targeted.
    pub record_id: String,
    /// What happened.
    pub status: DeletionStatus,
}

/// Some parts of a group were deleted and others were not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialCascadeFailure {
    /// Group that is now incomplete on the server.
    pub group_id: String,
    /// Parts that are gone.
    pub deleted: Vec<String>,
    /// Parts that remain because their delete failed.
    pub remaining: Vec<String>,
}

/// Result of deleting a record and its split siblings.
#[derive(Debug)]
pub struct DeletionResult {
    /// Id the caller asked to delete.
    pub requested_id: String,
    /// Group the record belonged to, if it was split.
    pub split_group_id: Option<String>,
    /// One outcome per targeted record, in split-index order.
    pub outcomes: Vec<DeletionOutcome>,
}

impl DeletionResult {
    /// Returns true if every targeted record is gone.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_gone())
    }

    /// Ids whose delete succeeded or found the record already gone.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<&str> {
        self.outcomes.iter().filter(|o| o.status.is_gone()).map(|o| o.record_id.as_str()).collect()
    }

    /// Failed deletes with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SdkError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            DeletionStatus::Failed(err) => Some((o.record_id.as_str(), err)),
            _ => None,
        })
    }

    /// Reports a group left half-deleted.
    ///
    /// Returns `None` if everything or nothing was deleted, or if the record
    /// was not split.
    #[must_use]
    pub fn partial_failure(&self) -> Option<PartialCascadeFailure> {
        let group_id = self.split_group_id.clone()?;
        let deleted: Vec<String> = self.deleted_ids().into_iter().map(str::to_owned).collect();
        let remaining: Vec<String> = self.failures().map(|(id, _)| id.to_owned()).collect();
        if deleted.is_empty() || remaining.is_empty() {
            return None;
        }
        Some(PartialCascadeFailure { group_id, deleted, remaining })
    }
}

/// Records a delete should target.
struct Targets {
    group_id: Option<String>,
    ids: Vec<String>,
}

impl Targets {
    fn single(record_id: &str) -> Self {
        Self { group_id: None, ids: vec![record_id.to_owned()] }
    }

    fn group(index: &SplitGroupIndex<'_>, group_id: &str) -> Self {
        Self {
            group_id: Some(group_id.to_owned()),
            ids: index.members_of(group_id).into_iter().map(|r| r.id.clone()).collect(),
        }
    }
}

/// Deletes records together with their split siblings.
#[derive(Debug, Clone)]
pub struct DeletionCascadeResolver {
    submitter: ItemSubmitter,
    kind: ResourceKind,
}

impl DeletionCascadeResolver {
    /// Creates a resolver for records of `kind`.
    pub fn new(submitter: ItemSubmitter, kind: ResourceKind) -> Self {
        Self { submitter, kind }
    }

    /// Deletes `record_id` and, if it is split, every other part of its group.
    ///
    /// `known` is consulted first. If it does not hold the record, or holds
    /// an incomplete group, the current records are listed from the server.
    /// A record found nowhere, or of a kind that never splits, gets a single
    /// delete.
    ///
    /// # Errors
    ///
    /// Returns the listing error if the group could not be resolved; no
    /// delete is issued in that case. Delete failures are reported in the
    /// result instead.
    pub async fn delete(
        &self,
        record_id: &str,
        known: Option<&SplitGroupIndex<'_>>,
    ) -> Result<DeletionResult> {
        let targets = self.resolve(record_id, known).await?;
        debug!(
            kind = %self.kind,
            record_id,
            group_id = targets.group_id.as_deref(),
            parts = targets.ids.len(),
            "deleting"
        );

        let mut outcomes = Vec::with_capacity(targets.ids.len());
        for id in targets.ids {
            let status = match self.submitter.delete(self.kind, &id).await {
                Ok(()) => DeletionStatus::Deleted,
                Err(SdkError::NotFound { .. }) => DeletionStatus::AlreadyAbsent,
                Err(err) => {
                    warn!(kind = %self.kind, record_id = %id, error = %err, "delete failed");
                    DeletionStatus::Failed(err)
                },
            };
            outcomes.push(DeletionOutcome { record_id: id, status });
        }

        let result = DeletionResult {
            requested_id: record_id.to_owned(),
            split_group_id: targets.group_id,
            outcomes,
        };
        if let Some(partial) = result.partial_failure() {
            warn!(
                group_id = %partial.group_id,
                deleted = partial.deleted.len(),
                remaining = partial.remaining.len(),
                "split group partially deleted"
            );
        }
        Ok(result)
    }

    async fn resolve(&self, record_id: &str, known: Option<&SplitGroupIndex<'_>>) -> Result<Targets> {
        if !self.kind.supports_split() {
            return Ok(Targets::single(record_id));
        }
        if let Some(index) = known
            && let Some(record) = index.record(record_id)
        {
            match record.split_group_id() {
                None => return Ok(Targets::single(record_id)),
                Some(group_id) if index.is_complete(group_id) => {
                    return Ok(Targets::group(index, group_id));
                },
                Some(group_id) => {
                    debug!(group_id, "known group incomplete; listing records");
                },
            }
        }

        let listed: Vec<PhysicalRecord> = self
            .submitter
            .list(self.kind, DEFAULT_PAGE_SIZE)
            .await?
            .into_iter()
            .map(|r| PhysicalRecord::from_server(r, None))
            .collect();
        let fresh = SplitGroupIndex::build(&listed);

        if let Some(group_id) = fresh.group_of(record_id) {
            return Ok(Targets::group(&fresh, group_id));
        }
        // Gone from the listing but known locally: clean up whatever siblings remain.
        if let Some(index) = known
            && let Some(group_id) = index.group_of(record_id)
        {
            let mut targets = Targets::group(index, group_id);
            for id in fresh.members_of(group_id).into_iter().map(|r| r.id.clone()) {
                if !targets.ids.contains(&id) {
                    targets.ids.push(id);
                }
            }
            return Ok(targets);
        }
        Ok(Targets::single(record_id))
    }
}
