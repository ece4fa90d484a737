//! Pure classification of incoming data against the stored entry.

use super::Conflict;
use crate::model::entry::{DataPoint, Entry};
use crate::model::field::Field;
use crate::model::source::SourceId;

/// Classification result for one incoming entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Stored entry with intrinsic fields merged and new points added.
    /// Conflicting fields still hold the stored value.
    pub planned: Entry,
    pub new_points: usize,
    pub unchanged_points: usize,
    /// Conflicts in `Field::ALL` order.
    pub conflicts: Vec<Conflict>,
}

/// Re-attributes every incoming data point to `source_id`.
pub fn attribute_to_source(mut incoming: Entry, source_id: SourceId) -> Entry {
    for points in incoming.data.values_mut() {
        for point in points.iter_mut() {
            point.source_id = source_id;
        }
    }
    incoming
}

/// Merges intrinsic attributes conservatively into `existing`.
///
/// Name sets are unioned; single values are filled only when absent.
pub fn merge_intrinsic(existing: &Entry, incoming: &Entry) -> Entry {
    fn fill(target: &mut Option<String>, value: &Option<String>) {
        if target.as_deref().map_or(true, |current| current.trim().is_empty()) {
            if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
                *target = Some(value.to_string());
            }
        }
    }

    let mut merged = existing.clone();
    merged.is_hybrid = existing.is_hybrid || incoming.is_hybrid;
    fill(&mut merged.author, &incoming.author);
    fill(&mut merged.conservation_status, &incoming.conservation_status);
    fill(&mut merged.subgenus, &incoming.subgenus);
    fill(&mut merged.section, &incoming.section);
    fill(&mut merged.subsection, &incoming.subsection);
    fill(&mut merged.complex, &incoming.complex);
    if merged.is_hybrid {
        fill(&mut merged.parent1, &incoming.parent1);
        fill(&mut merged.parent2, &incoming.parent2);
    }
    if merged.preferred_source.is_none() {
        merged.preferred_source = incoming.preferred_source;
    }
    merged.hybrids.extend(incoming.hybrids.iter().cloned());
    merged
        .closely_related_to
        .extend(incoming.closely_related_to.iter().cloned());
    merged
        .subspecies_varieties
        .extend(incoming.subspecies_varieties.iter().cloned());
    merged.synonyms.extend(incoming.synonyms.iter().cloned());
    merged
}

/// Classifies the designated source's points of `incoming`.
///
/// `incoming` must already be attributed to `source_id`. Points of other
/// sources in `existing` are carried over untouched and never compared.
pub fn classify_entry(
    existing: Option<&Entry>,
    incoming: &Entry,
    source_id: SourceId,
) -> Classification {
    let mut planned = match existing {
        Some(existing) => merge_intrinsic(existing, incoming),
        None => {
            let mut created = incoming.clone();
            created.data.clear();
            created
        }
    };

    let mut new_points = 0;
    let mut unchanged_points = 0;
    let mut conflicts = Vec::new();

    for field in Field::ALL {
        for point in incoming
            .data_points(field)
            .iter()
            .filter(|point| point.source_id == source_id)
        {
            match planned.data_point_for(field, source_id) {
                None => {
                    planned.upsert_data_point(field, point.clone());
                    new_points += 1;
                }
                Some(current) if current.value == point.value => unchanged_points += 1,
                Some(current) => conflicts.push(Conflict {
                    entry: incoming.name.clone(),
                    field,
                    source_id,
                    existing: current.value.clone(),
                    incoming: point.value.clone(),
                }),
            }
        }
    }

    Classification {
        planned,
        new_points,
        unchanged_points,
        conflicts,
    }
}

/// Incoming point for one conflict, if still present.
pub(crate) fn incoming_point<'e>(
    incoming: &'e Entry,
    conflict: &Conflict,
) -> Option<&'e DataPoint> {
    incoming.data_point_for(conflict.field, conflict.source_id)
}
