use std::collections::HashMap;

use serde::Serialize;

use crate::{DeltaType, EventRecord, identity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
	pub added: u32,
	pub removed: u32,
	pub changed: u32,
	pub total: u32,
}

/// Outcome of a keyed snapshot diff. An empty result still carries an
/// explicit zero-count summary, distinct from "diff not computed".
#[derive(Debug, Default)]
pub struct KeyedDelta {
	pub records: Vec<EventRecord>,
	pub summary: DeltaSummary,
}

/// Diff two snapshots keyed on the natural key. Added and changed rows
/// carry the new record, removed rows the former record. No previous
/// snapshot means bootstrap: everything in `current` is added.
/// Classification compares key identity and content hash only, never row
/// position, so it is stable under reordering of either snapshot.
pub fn compute_keyed_delta(
	previous: Option<&[EventRecord]>,
	current: &[EventRecord],
) -> KeyedDelta {
	let Some(previous) = previous else {
		let mut delta = KeyedDelta::default();

		for record in current {
			let mut record = record.clone();

			record.delta_type = Some(DeltaType::Added);

			delta.records.push(record);
			delta.summary.added += 1;
		}

		delta.summary.total = delta.summary.added;

		return delta;
	};
	let previous_by_key: HashMap<&str, &EventRecord> =
		previous.iter().map(|record| (record.id.as_str(), record)).collect();
	let current_by_key: HashMap<&str, &EventRecord> =
		current.iter().map(|record| (record.id.as_str(), record)).collect();
	let mut delta = KeyedDelta::default();

	for record in current {
		match previous_by_key.get(record.id.as_str()) {
			None => {
				let mut record = record.clone();

				record.delta_type = Some(DeltaType::Added);

				delta.records.push(record);
				delta.summary.added += 1;
			},
			Some(former) =>
				if identity::content_hash(record) != identity::content_hash(former) {
					let mut record = record.clone();

					record.delta_type = Some(DeltaType::Changed);

					delta.records.push(record);
					delta.summary.changed += 1;
				},
		}
	}
	for record in previous {
		if !current_by_key.contains_key(record.id.as_str()) {
			let mut record = record.clone();

			record.delta_type = Some(DeltaType::Removed);

			delta.records.push(record);
			delta.summary.removed += 1;
		}
	}

	delta.summary.total = delta.summary.added + delta.summary.changed + delta.summary.removed;

	delta
}
