//! Response normalization.
//!
//! Turns raw create responses into [`PhysicalRecord`]s tagged with the
//! position of the input that produced them. A response entry is either a
//! single record or, when the server split an input, an array of parts that
//! share a `split_group_id`.
//!
//! Entries align with inputs by position. Parts within an entry are ordered
//! by `split_index`. When the server omits split metadata on a multi-part
//! entry it is synthesized deterministically; when the metadata is present
//! but its indices or totals do not match the parts returned, it is kept as
//! received. Either way a [`DataIntegrityWarning`] is attached to every
//! affected record.

use serde_json::Value;
use text2everything_types::{
    DataIntegrityWarning, IntegrityIssue, LogicalInput, OneOrMany, PhysicalRecord, ServerRecord,
    SplitInfo,
};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, SdkError};

/// Namespace for group identifiers derived from a part's record id.
const SYNTHETIC_GROUP_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_2a1e_94d7_4b8a_a5e0_7c21_d9b4_3f68);

/// Records and warnings produced from one or more response entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Records in input order, parts ordered by split index.
    pub records: Vec<PhysicalRecord>,
    /// Every warning raised, in the order raised.
    pub warnings: Vec<DataIntegrityWarning>,
}

impl Normalized {
    /// Appends another normalization result.
    pub fn extend(&mut self, other: Normalized) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
    }
}

/// Decodes a bulk response body into one entry per submitted input.
///
/// Always returns exactly `expected_entries` slots, one per input position.
/// A bare array whose length matches is read positionally. For a
/// single-input submission the server may instead answer with the entry
/// itself: a lone record, or the array of its split parts.
///
/// A body that cannot be fully aligned still yields whatever it can: an array
/// of the wrong length is read positionally up to the shorter of the two,
/// and every slot without a usable entry holds [`SdkError::ResponseShape`].
/// The server has already stored these records, so no slot is dropped
/// silently.
pub fn parse_bulk_response(body: Value, expected_entries: usize) -> Vec<Result<OneOrMany<ServerRecord>>> {
    match body {
        Value::Array(items) if items.len() == expected_entries => {
            items.into_iter().enumerate().map(|(position, item)| decode_entry(item, position)).collect()
        },
        Value::Array(items)
            if expected_entries == 1 && !items.is_empty() && items.iter().all(Value::is_object) =>
        {
            vec![decode_entry(Value::Array(items), 0)]
        },
        Value::Array(items) => {
            let received = items.len();
            warn!(received, expected = expected_entries, "bulk response misaligned with inputs");
            let mut items = items.into_iter();
            (0..expected_entries)
                .map(|position| match items.next() {
                    Some(item) => decode_entry(item, position),
                    None => Err(SdkError::ResponseShape {
                        message: format!(
                            "bulk response has {received} entries for {expected_entries} inputs; \
                             none for position {position}"
                        ),
                    }),
                })
                .collect()
        },
        Value::Object(_) if expected_entries == 1 => vec![decode_entry(body, 0)],
        other => {
            let message =
                format!("expected an array of {expected_entries} entries, got {}", json_type(&other));
            (0..expected_entries).map(|_| Err(SdkError::ResponseShape { message: message.clone() })).collect()
        },
    }
}

/// Decodes the body of a single-item create.
///
/// # Errors
///
/// Returns [`SdkError::ResponseShape`] if the body is neither a record nor an
/// array of records.
pub fn parse_entry(body: Value) -> Result<OneOrMany<ServerRecord>> {
    match body {
        Value::Array(_) | Value::Object(_) => decode_entry(body, 0),
        other => Err(SdkError::ResponseShape {
            message: format!("expected a record or array of records, got {}", json_type(&other)),
        }),
    }
}

fn decode_entry(value: Value, position: usize) -> Result<OneOrMany<ServerRecord>> {
    serde_json::from_value(value).map_err(|e| SdkError::ResponseShape {
        message: format!("entry {position} is not a record or array of records: {e}"),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Normalizes a bulk response already split into entries.
///
/// # Errors
///
/// Returns [`SdkError::ResponseShape`] if the entry count differs from the
/// input count or any entry is an empty array.
pub fn normalize(entries: Vec<OneOrMany<ServerRecord>>, inputs: &[LogicalInput]) -> Result<Normalized> {
    if entries.len() != inputs.len() {
        return Err(SdkError::ResponseShape {
            message: format!("response has {} entries for {} inputs", entries.len(), inputs.len()),
        });
    }

    let mut normalized = Normalized::default();
    for (entry, input) in entries.into_iter().zip(inputs) {
        normalized.extend(normalize_entry(entry, input.sequence_index)?);
    }
    Ok(normalized)
}

/// Normalizes the response entry of the input at `origin_sequence_index`.
///
/// # Errors
///
/// Returns [`SdkError::ResponseShape`] if the entry is an empty array.
pub fn normalize_entry(entry: OneOrMany<ServerRecord>, origin_sequence_index: usize) -> Result<Normalized> {
    let parts = match entry {
        OneOrMany::One(record) => {
            return Ok(single(record, origin_sequence_index));
        },
        OneOrMany::Many(parts) => parts,
    };

    match parts.len() {
        0 => Err(SdkError::ResponseShape {
            message: format!("server returned no records for input {origin_sequence_index}"),
        }),
        1 if !parts[0].has_split_fields() => {
            let record = parts.into_iter().next().map(|r| single(r, origin_sequence_index));
            Ok(record.unwrap_or_default())
        },
        _ => normalize_split(parts, origin_sequence_index),
    }
}

fn single(record: ServerRecord, origin: usize) -> Normalized {
    Normalized {
        records: vec![PhysicalRecord::from_server(record, Some(origin))],
        warnings: Vec::new(),
    }
}

fn normalize_split(mut parts: Vec<ServerRecord>, origin: usize) -> Result<Normalized> {
    let total = u32::try_from(parts.len()).map_err(|_| SdkError::ResponseShape {
        message: format!("input {origin} produced {} parts", parts.len()),
    })?;
    let mut warnings = Vec::new();

    let known_group = parts.iter().find_map(|p| p.split_group_id.clone());
    let group_id = match known_group {
        Some(group_id) => {
            if parts.iter().any(|p| p.split_group_id.is_none()) {
                warnings.push(warning(
                    IntegrityIssue::SynthesizedGroupId,
                    origin,
                    &group_id,
                    format!("some parts of input {origin} lacked split_group_id; filled with {group_id}"),
                ));
            }
            group_id
        },
        None => {
            let group_id =
                Uuid::new_v5(&SYNTHETIC_GROUP_NAMESPACE, parts[0].id.as_bytes()).to_string();
            warnings.push(warning(
                IntegrityIssue::SynthesizedGroupId,
                origin,
                &group_id,
                format!(
                    "input {origin} returned {total} records without split_group_id; \
                     derived {group_id} from record {}",
                    parts[0].id
                ),
            ));
            group_id
        },
    };

    let positions_known = parts.iter().all(|p| p.split_index.is_some() && p.total_splits.is_some());
    if !positions_known {
        warnings.push(warning(
            IntegrityIssue::SynthesizedSplitIndex,
            origin,
            &group_id,
            format!("input {origin} returned parts without split_index/total_splits; using response order"),
        ));
    }

    // Stable, so parts with equal indices keep response order.
    if positions_known {
        parts.sort_by_key(|p| p.split_index);
        if let Some(problem) = position_problem(&parts, total) {
            warnings.push(warning(
                IntegrityIssue::InconsistentSplitPositions,
                origin,
                &group_id,
                format!("input {origin} returned {total} parts with {problem}"),
            ));
        }
    }

    for warning in &warnings {
        warn!(
            origin_sequence_index = origin,
            group_id = %warning.group_id,
            issue = ?warning.issue,
            "{}",
            warning.message
        );
    }

    let records = parts
        .into_iter()
        .zip(1..)
        .map(|(part, position)| {
            let (index, part_total) = if positions_known {
                (part.split_index.unwrap_or(position), part.total_splits.unwrap_or(total))
            } else {
                (position, total)
            };
            PhysicalRecord {
                id: part.id,
                origin_sequence_index: Some(origin),
                split: Some(SplitInfo { group_id: group_id.clone(), index, total: part_total }),
                fields: part.fields,
                warnings: warnings.clone(),
            }
        })
        .collect();

    Ok(Normalized { records, warnings })
}

/// Describes how sorted `parts` deviate from indices `1..=total`, each once,
/// all declaring `total` parts.
fn position_problem(parts: &[ServerRecord], total: u32) -> Option<String> {
    let indices: Vec<u32> = parts.iter().filter_map(|p| p.split_index).collect();
    if !indices.iter().copied().eq(1..=total) {
        return Some(format!("split indices {indices:?}"));
    }
    parts
        .iter()
        .filter_map(|p| p.total_splits)
        .find(|&declared| declared != total)
        .map(|declared| format!("total_splits {declared}"))
}

fn warning(issue: IntegrityIssue, origin: usize, group_id: &str, message: String) -> DataIntegrityWarning {
    DataIntegrityWarning {
        issue,
        origin_sequence_index: origin,
        group_id: group_id.to_owned(),
        message,
    }
}
