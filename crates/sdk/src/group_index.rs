//! Split group index.
//!
//! [`SplitGroupIndex`] is a read-only view over a slice of
//! [`PhysicalRecord`]s that answers group-level questions: which records
//! form a group, whether the group is complete, and which record belongs to
//! which group. The index borrows the records, so it cannot outlive or drift
//! from the collection it was built from.

use std::collections::{BTreeMap, HashMap};

use text2everything_types::PhysicalRecord;

/// All parts of one split group, ordered by split index.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitGroup<'a> {
    /// Shared group identifier.
    pub group_id: &'a str,
    /// Parts ordered by split index; ties keep collection order.
    pub members: Vec<&'a PhysicalRecord>,
}

impl SplitGroup<'_> {
    /// Group size declared by the first member.
    #[must_use]
    pub fn total_splits(&self) -> Option<u32> {
        self.members.first().and_then(|r| r.total_splits())
    }

    /// Returns true if the number of members equals the declared group size.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_splits().is_some_and(|total| self.members.len() == total as usize)
    }

    /// Member record identifiers in split-index order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.members.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Cap on the indices listed in [`GroupValidation::missing`].
pub const MAX_LISTED_MISSING: usize = 256;

/// Result of checking a group's split indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupValidation {
    /// Group that was checked.
    pub group_id: String,
    /// Group size declared by the first member, if any member exists.
    pub expected_total: Option<u32>,
    /// Split indices present, ascending, duplicates included.
    pub present: Vec<u32>,
    /// Indices in `1..=expected_total` with no member, ascending, at most
    /// [`MAX_LISTED_MISSING`] of them.
    pub missing: Vec<u32>,
    /// Number of indices in `1..=expected_total` with no member.
    pub missing_count: u64,
    /// Indices held by more than one member.
    pub duplicates: Vec<u32>,
    /// Indices outside `1..=expected_total`.
    pub out_of_range: Vec<u32>,
    /// True if members disagree on the group size.
    pub inconsistent_totals: bool,
}

impl GroupValidation {
    /// Returns true if the group holds exactly indices `1..=expected_total`,
    /// each once, and every member agrees on the total.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expected_total.is_some_and(|total| total > 0)
            && self.missing_count == 0
            && self.duplicates.is_empty()
            && self.out_of_range.is_empty()
            && !self.inconsistent_totals
    }
}

/// Index of split groups over a record collection.
#[derive(Debug, Clone)]
pub struct SplitGroupIndex<'a> {
    records: &'a [PhysicalRecord],
    /// Group id to member positions in collection order.
    groups: HashMap<&'a str, Vec<usize>>,
    /// Group ids in first-seen order.
    order: Vec<&'a str>,
    /// Record id to position.
    by_id: HashMap<&'a str, usize>,
}

impl<'a> SplitGroupIndex<'a> {
    /// Builds the index over `records`.
    #[must_use]
    pub fn build(records: &'a [PhysicalRecord]) -> Self {
        let mut groups: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut order = Vec::new();
        let mut by_id = HashMap::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            by_id.entry(record.id.as_str()).or_insert(position);
            if let Some(group_id) = record.split_group_id() {
                let members = groups.entry(group_id).or_insert_with(|| {
                    order.push(group_id);
                    Vec::new()
                });
                members.push(position);
            }
        }

        Self { records, groups, order, by_id }
    }

    /// The indexed records.
    #[must_use]
    pub fn records(&self) -> &'a [PhysicalRecord] {
        self.records
    }

    /// Group identifiers in the order they first appear.
    pub fn groups(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.order.iter().copied()
    }

    /// Number of distinct groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.order.len()
    }

    /// Members of `group_id` ordered by split index; empty if unknown.
    #[must_use]
    pub fn members_of(&self, group_id: &str) -> Vec<&'a PhysicalRecord> {
        let records = self.records;
        let mut members: Vec<&'a PhysicalRecord> = self
            .groups
            .get(group_id)
            .map(|positions| positions.iter().map(|&p| &records[p]).collect())
            .unwrap_or_default();
        members.sort_by_key(|r| r.split_index());
        members
    }

    /// Returns the group view for `group_id`.
    #[must_use]
    pub fn group(&self, group_id: &str) -> Option<SplitGroup<'a>> {
        let (&key, _) = self.groups.get_key_value(group_id)?;
        Some(SplitGroup { group_id: key, members: self.members_of(group_id) })
    }

    /// Returns true if the number of members present equals the group's
    /// `total_splits`.
    #[must_use]
    pub fn is_complete(&self, group_id: &str) -> bool {
        self.group(group_id).is_some_and(|g| g.is_complete())
    }

    /// Checks the split indices of `group_id`.
    #[must_use]
    pub fn validate(&self, group_id: &str) -> GroupValidation {
        let members = self.members_of(group_id);
        let expected_total = members.first().and_then(|r| r.total_splits());
        let inconsistent_totals = members.iter().any(|r| r.total_splits() != expected_total);

        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for index in members.iter().filter_map(|r| r.split_index()) {
            *counts.entry(index).or_default() += 1;
        }

        let total = expected_total.unwrap_or(0);
        let present = counts.iter().flat_map(|(&i, &n)| std::iter::repeat_n(i, n)).collect();
        let duplicates = counts.iter().filter(|&(_, &n)| n > 1).map(|(&i, _)| i).collect();
        let out_of_range = counts.keys().copied().filter(|&i| i == 0 || i > total).collect();
        let present_in_range = counts.keys().filter(|i| (1..=total).contains(*i)).count() as u64;
        let missing_count = u64::from(total) - present_in_range;
        // The scan ends after at most `counts.len() + MAX_LISTED_MISSING` steps
        // however large the declared total.
        let missing =
            (1..=total).filter(|i| !counts.contains_key(i)).take(MAX_LISTED_MISSING).collect();

        GroupValidation {
            group_id: group_id.to_owned(),
            expected_total,
            present,
            missing,
            missing_count,
            duplicates,
            out_of_range,
            inconsistent_totals,
        }
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn record(&self, record_id: &str) -> Option<&'a PhysicalRecord> {
        let records = self.records;
        self.by_id.get(record_id).map(|&p| &records[p])
    }

    /// Returns the group `record_id` belongs to, if it is split.
    #[must_use]
    pub fn group_of(&self, record_id: &str) -> Option<&'a str> {
        self.record(record_id)?.split_group_id()
    }

    /// Records that are not part of any split group.
    pub fn ungrouped(&self) -> impl Iterator<Item = &'a PhysicalRecord> + '_ {
        self.records.iter().filter(|r| !r.is_split())
    }
}
