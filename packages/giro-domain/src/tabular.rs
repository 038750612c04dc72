use std::collections::HashMap;

use csv::StringRecord;

use crate::{DeltaSummary, Error, Result};

/// Separator for composite keys. Never appears in CSV cell data.
const KEY_SEPARATOR: char = '\u{1f}';

/// Tabular diff output. `columns` lists the key columns, `delta_type`,
/// then the `old_`/`new_` prefixed field families; every entry in `rows`
/// is aligned to `columns`, with empty strings where a family does not
/// apply (no `old_` values for added rows, no `new_` values for removed
/// rows).
#[derive(Debug)]
pub struct TabularDelta {
	pub columns: Vec<String>,
	pub rows: Vec<Vec<String>>,
	pub summary: DeltaSummary,
}

/// Diff two CSV snapshots keyed by explicit key column(s). A key column
/// missing from either side is a hard error; rows are matched by key
/// identity, never by position. Identical inputs produce an explicit
/// all-zero summary.
pub fn compute_tabular_delta(
	old_csv: &[u8],
	new_csv: &[u8],
	keys: &[String],
) -> Result<TabularDelta> {
	if keys.is_empty() {
		return Err(Error::InvalidInput {
			message: "At least one key column is required.".to_string(),
		});
	}

	let (old_headers, old_rows) = read_table(old_csv)?;
	let (new_headers, new_rows) = read_table(new_csv)?;

	for key in keys {
		if !old_headers.contains(key) || !new_headers.contains(key) {
			return Err(Error::MissingKeyColumn { key: key.clone() });
		}
	}

	let old_index = column_index(&old_headers);
	let new_index = column_index(&new_headers);
	let old_by_key: HashMap<String, &StringRecord> = old_rows
		.iter()
		.map(|row| (composite_key(&old_index, row, keys), row))
		.collect();
	let new_by_key: HashMap<String, &StringRecord> = new_rows
		.iter()
		.map(|row| (composite_key(&new_index, row, keys), row))
		.collect();
	let old_fields: Vec<String> =
		old_headers.iter().filter(|c| !keys.contains(c)).cloned().collect();
	let mut value_fields = old_fields.clone();

	for column in new_headers.iter().filter(|c| !keys.contains(c)) {
		if !value_fields.contains(column) {
			value_fields.push(column.clone());
		}
	}

	let mut columns: Vec<String> = keys.to_vec();

	columns.push("delta_type".to_string());
	columns.extend(value_fields.iter().map(|c| format!("old_{c}")));
	columns.extend(value_fields.iter().map(|c| format!("new_{c}")));

	let mut rows = Vec::new();
	let mut summary = DeltaSummary::default();

	for row in &new_rows {
		let key = composite_key(&new_index, row, keys);

		if !old_by_key.contains_key(&key) {
			rows.push(render_row(
				keys,
				&value_fields,
				"added",
				None,
				Some((&new_index, row)),
			));

			summary.added += 1;
		}
	}
	for row in &old_rows {
		let key = composite_key(&old_index, row, keys);

		if !new_by_key.contains_key(&key) {
			rows.push(render_row(
				keys,
				&value_fields,
				"removed",
				Some((&old_index, row)),
				None,
			));

			summary.removed += 1;
		}
	}
	for new_row in &new_rows {
		let key = composite_key(&new_index, new_row, keys);
		let Some(old_row) = old_by_key.get(&key) else {
			continue;
		};
		let differs = value_fields.iter().any(|column| {
			cell(&old_index, old_row, column) != cell(&new_index, new_row, column)
		});

		if differs {
			rows.push(render_row(
				keys,
				&value_fields,
				"changed",
				Some((&old_index, old_row)),
				Some((&new_index, new_row)),
			));

			summary.changed += 1;
		}
	}

	summary.total = summary.added + summary.removed + summary.changed;

	Ok(TabularDelta { columns, rows, summary })
}

fn read_table(bytes: &[u8]) -> Result<(Vec<String>, Vec<StringRecord>)> {
	let mut reader = csv::Reader::from_reader(bytes);
	let headers = reader.headers()?.iter().map(str::to_string).collect();
	let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

	Ok((headers, rows))
}

fn column_index(headers: &[String]) -> HashMap<String, usize> {
	headers.iter().enumerate().map(|(idx, name)| (name.clone(), idx)).collect()
}

fn composite_key(index: &HashMap<String, usize>, row: &StringRecord, keys: &[String]) -> String {
	let mut out = String::new();

	for (pos, key) in keys.iter().enumerate() {
		if pos > 0 {
			out.push(KEY_SEPARATOR);
		}

		out.push_str(cell(index, row, key));
	}

	out
}

fn cell<'a>(index: &HashMap<String, usize>, row: &'a StringRecord, column: &str) -> &'a str {
	index.get(column).and_then(|idx| row.get(*idx)).unwrap_or("")
}

fn render_row(
	keys: &[String],
	value_fields: &[String],
	delta_type: &str,
	old: Option<(&HashMap<String, usize>, &StringRecord)>,
	new: Option<(&HashMap<String, usize>, &StringRecord)>,
) -> Vec<String> {
	// Key values come from whichever side is present; changed rows agree
	// by construction.
	let key_source = new.or(old);
	let mut out = Vec::with_capacity(keys.len() + 1 + value_fields.len() * 2);

	for key in keys {
		let value = key_source.map(|(index, row)| cell(index, row, key)).unwrap_or("");

		out.push(value.to_string());
	}

	out.push(delta_type.to_string());

	for column in value_fields {
		let value = old.map(|(index, row)| cell(index, row, column)).unwrap_or("");

		out.push(value.to_string());
	}
	for column in value_fields {
		let value = new.map(|(index, row)| cell(index, row, column)).unwrap_or("");

		out.push(value.to_string());
	}

	out
}
