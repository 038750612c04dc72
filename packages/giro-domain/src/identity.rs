use time::format_description::well_known::Rfc3339;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::EventRecord;

/// Upper bound on the canonical text fed to hashing and embedding.
const MAX_CANONICAL_CHARS: usize = 2_000;

/// Deterministic physical id for a logical event, derived from the
/// natural key alone so the same index point is reused across runs even
/// when the event's content (dates included) changes. Feeds that emit
/// one record per occurrence must encode the occurrence in the key.
pub fn derive_point_id(natural_key: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, natural_key.as_bytes())
}

/// Random id for a record without a natural key. Such a record can never
/// be re-matched on a later run; callers log it as a recoverable
/// inconsistency.
pub fn fallback_point_id() -> Uuid {
	Uuid::new_v4()
}

/// NFC-normalized, whitespace-collapsed, length-capped text.
pub fn normalize_text(text: &str) -> String {
	let normalized: String = text.nfc().collect();
	let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

	collapsed.chars().take(MAX_CANONICAL_CHARS).collect()
}

/// The one canonical text representation of an event's content. This
/// single definition feeds both [`content_hash`] and the embedding input;
/// keeping them coupled is what makes the unchanged-skip detection sound.
pub fn canonical_content(record: &EventRecord) -> String {
	let start = record.start_date.map(format_timestamp).unwrap_or_default();
	let end = record.end_date.map(format_timestamp).unwrap_or_default();
	let parts = [
		normalize_text(&record.title),
		normalize_text(&record.description),
		start,
		end,
	];
	let joined = parts.join("\n");

	joined.chars().take(MAX_CANONICAL_CHARS).collect()
}

/// Digest over the fields defining "meaningful change". Identical hash
/// means the stored point is left untouched and no embedding is computed.
pub fn content_hash(record: &EventRecord) -> String {
	blake3::hash(canonical_content(record).as_bytes()).to_hex().to_string()
}

fn format_timestamp(ts: time::OffsetDateTime) -> String {
	ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}
