use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{PointId, Value, point_id::PointIdOptions, value::Kind},
};
use uuid::Uuid;

use crate::Result;

/// Build a point payload from a JSON object. Non-object values are
/// rejected by the client library.
pub fn json_to_payload(value: serde_json::Value) -> Result<Payload> {
	Ok(Payload::try_from(value)?)
}

pub fn payload_to_json(payload: &HashMap<String, Value>) -> serde_json::Value {
	serde_json::Value::Object(
		payload.iter().map(|(key, value)| (key.clone(), value_to_json(value))).collect(),
	)
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
	match &value.kind {
		None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
		Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
		Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
		Some(Kind::DoubleValue(d)) => serde_json::Value::from(*d),
		Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
		Some(Kind::StructValue(map)) => serde_json::Value::Object(
			map.fields.iter().map(|(key, value)| (key.clone(), value_to_json(value))).collect(),
		),
		Some(Kind::ListValue(list)) =>
			serde_json::Value::Array(list.values.iter().map(value_to_json).collect()),
	}
}

pub fn point_id_to_uuid(id: &PointId) -> Option<Uuid> {
	match id.point_id_options.as_ref()? {
		PointIdOptions::Uuid(raw) => Uuid::parse_str(raw).ok(),
		PointIdOptions::Num(_) => None,
	}
}
