use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result};

/// Delta classification of a record relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaType {
	Added,
	Changed,
	Removed,
}
impl DeltaType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Added => "added",
			Self::Changed => "changed",
			Self::Removed => "removed",
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
	#[serde(default)]
	pub venue: String,
	#[serde(default)]
	pub address: String,
	#[serde(default)]
	pub latitude: Option<f64>,
	#[serde(default)]
	pub longitude: Option<f64>,
}

/// The canonical shape every feed adapter must produce before a record
/// reaches the delta classifier or the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
	/// Natural key assigned by the feed adapter. May be empty, in which
	/// case the record can never be re-matched on a later run.
	#[serde(default)]
	pub id: String,
	pub title: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub city: String,
	#[serde(default)]
	pub location: Location,
	#[serde(default, with = "rfc3339")]
	pub start_date: Option<OffsetDateTime>,
	#[serde(default, with = "rfc3339")]
	pub end_date: Option<OffsetDateTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default)]
	pub credits: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delta_type: Option<DeltaType>,
}
impl EventRecord {
	pub fn validate(&self) -> Result<()> {
		if let (Some(start), Some(end)) = (self.start_date, self.end_date)
			&& start > end
		{
			return Err(Error::InvalidRecord {
				message: format!("start_date must not be after end_date for {:?}.", self.id),
			});
		}
		if let Some(lat) = self.location.latitude
			&& !(-90.0..=90.0).contains(&lat)
		{
			return Err(Error::InvalidRecord {
				message: format!("latitude {lat} out of range for {:?}.", self.id),
			});
		}
		if let Some(lon) = self.location.longitude
			&& !(-180.0..=180.0).contains(&lon)
		{
			return Err(Error::InvalidRecord {
				message: format!("longitude {lon} out of range for {:?}.", self.id),
			});
		}

		Ok(())
	}

	/// Both coordinates present and inside valid geographic ranges.
	pub fn has_valid_coordinates(&self) -> bool {
		matches!(
			(self.location.latitude, self.location.longitude),
			(Some(lat), Some(lon))
				if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
		)
	}
}

/// RFC 3339 serde for the optional event dates.
mod rfc3339 {
	use serde::{Deserialize as _, Deserializer, Serializer, de, ser};
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value.map(|ts| ts.format(&Rfc3339)) {
			Some(Ok(formatted)) => serializer.serialize_str(&formatted),
			Some(Err(err)) => Err(ser::Error::custom(err)),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<String>::deserialize(deserializer)?
			.map(|raw| OffsetDateTime::parse(&raw, &Rfc3339).map_err(de::Error::custom))
			.transpose()
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn record() -> EventRecord {
		EventRecord {
			id: "E1".to_string(),
			title: "Sagra".to_string(),
			category: String::new(),
			description: String::new(),
			city: "Padova".to_string(),
			location: Location::default(),
			start_date: Some(datetime!(2025-08-23 18:00 UTC)),
			end_date: Some(datetime!(2025-08-24 23:00 UTC)),
			url: None,
			credits: String::new(),
			image_url: None,
			delta_type: None,
		}
	}

	#[test]
	fn accepts_valid_record() {
		assert!(record().validate().is_ok());
	}

	#[test]
	fn rejects_inverted_interval() {
		let mut rec = record();

		rec.end_date = Some(datetime!(2025-08-22 00:00 UTC));

		assert!(rec.validate().is_err());
	}

	#[test]
	fn rejects_out_of_range_coordinates() {
		let mut rec = record();

		rec.location.latitude = Some(91.0);
		rec.location.longitude = Some(11.9);

		assert!(rec.validate().is_err());
		assert!(!rec.has_valid_coordinates());
	}

	#[test]
	fn dates_round_trip_as_rfc3339_strings() {
		let json = serde_json::to_value(record()).expect("serialize");

		assert_eq!(json["start_date"], "2025-08-23T18:00:00Z");

		let back: EventRecord = serde_json::from_value(json).expect("deserialize");

		assert_eq!(back.start_date, record().start_date);

		let bare: EventRecord =
			serde_json::from_value(serde_json::json!({ "title": "Sagra" })).expect("deserialize");

		assert_eq!(bare.start_date, None);
	}

	#[test]
	fn zero_zero_is_a_valid_coordinate() {
		let mut rec = record();

		rec.location.latitude = Some(0.0);
		rec.location.longitude = Some(0.0);

		assert!(rec.validate().is_ok());
		assert!(rec.has_valid_coordinates());
	}
}
