use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Coordinate, Error, Result};

/// Snapping radius in meters for route endpoints, matching the provider
/// default we rely on.
const SNAP_RADIUS_M: f64 = 1_000.0;

pub fn client(cfg: &giro_config::Routing) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?)
}

/// Fetch an ordered coordinate sequence between two points from the
/// routing provider, as a GeoJSON LineString.
pub async fn directions(
	cfg: &giro_config::Routing,
	client: &Client,
	origin: Coordinate,
	destination: Coordinate,
	profile: &str,
) -> Result<Vec<Coordinate>> {
	let url = format!("{}/v2/directions/{profile}/geojson", cfg.api_base);
	let body = serde_json::json!({
		"coordinates": [[origin.lon, origin.lat], [destination.lon, destination.lat]],
		"radiuses": [SNAP_RADIUS_M, SNAP_RADIUS_M],
	});
	let res = client
		.post(url)
		.header("Authorization", cfg.api_key.as_str())
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_directions(&json)
}

fn parse_directions(json: &Value) -> Result<Vec<Coordinate>> {
	let coordinates = json
		.get("features")
		.and_then(|v| v.as_array())
		.and_then(|features| features.first())
		.and_then(|feature| feature.get("geometry"))
		.and_then(|geometry| geometry.get("coordinates"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Routing response is missing LineString coordinates.".to_string(),
		})?;
	let mut out = Vec::with_capacity(coordinates.len());

	for pair in coordinates {
		let lon = pair.get(0).and_then(Value::as_f64);
		let lat = pair.get(1).and_then(Value::as_f64);
		let (Some(lon), Some(lat)) = (lon, lat) else {
			return Err(Error::InvalidResponse {
				message: "Routing coordinate pair is not numeric.".to_string(),
			});
		};

		out.push(Coordinate { lon, lat });
	}

	Ok(out)
}
