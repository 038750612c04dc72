use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::time;

use crate::{Coordinate, Result};

/// Delay between fallback attempts against the primary provider, per its
/// usage policy.
const LADDER_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredAddress {
	pub street: String,
	pub city: String,
}

pub fn client(cfg: &giro_config::Geocoding) -> Result<Client> {
	Ok(Client::builder()
		.user_agent(cfg.user_agent.clone())
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()?)
}

/// Resolve an address to a coordinate: the primary structured provider is
/// tried over a ladder of progressively looser parameter sets, then the
/// secondary free-text provider. `None` means every provider had no
/// result, a legitimate outcome that callers must not cache, since
/// upstream data is eventually consistent. A (0,0) sentinel is never
/// produced; the absence of a result is always `None`.
pub async fn geocode(
	cfg: &giro_config::Geocoding,
	client: &Client,
	address: &StructuredAddress,
) -> Result<Option<Coordinate>> {
	if let Some(coordinate) = primary(cfg, client, address).await {
		return Ok(Some(coordinate));
	}
	if let Some(coordinate) = secondary(cfg, client, address).await {
		return Ok(Some(coordinate));
	}

	Ok(None)
}

async fn primary(
	cfg: &giro_config::Geocoding,
	client: &Client,
	address: &StructuredAddress,
) -> Option<Coordinate> {
	let street = address.street.trim();
	let city = address.city.trim();
	let ladder: [Vec<(&str, &str)>; 4] = [
		vec![
			("street", street),
			("city", city),
			("state", &cfg.region),
			("country", &cfg.country),
		],
		vec![("city", city), ("state", &cfg.region), ("country", &cfg.country)],
		vec![("street", street), ("city", city), ("country", &cfg.country)],
		vec![("street", street), ("state", &cfg.region), ("country", &cfg.country)],
	];
	let url = format!("{}/search", cfg.primary_base);

	for (attempt, params) in ladder.iter().enumerate() {
		let mut query: Vec<(&str, &str)> =
			params.iter().filter(|(_, value)| !value.is_empty()).cloned().collect();

		query.push(("format", "json"));
		query.push(("limit", "1"));

		match fetch_json(client, &url, &query).await {
			Ok(json) =>
				if let Some(coordinate) = parse_primary(&json) {
					return Some(coordinate);
				},
			Err(err) => {
				tracing::warn!(error = %err, attempt, "Primary geocoding attempt failed.");
			},
		}

		time::sleep(LADDER_DELAY).await;
	}

	None
}

async fn secondary(
	cfg: &giro_config::Geocoding,
	client: &Client,
	address: &StructuredAddress,
) -> Option<Coordinate> {
	let url = format!("{}/api", cfg.secondary_base);
	let text = format!("{}, {}", address.street.trim(), address.city.trim());
	let query = [("q", text.as_str()), ("limit", "1")];

	match fetch_json(client, &url, &query).await {
		Ok(json) => parse_secondary(&json),
		Err(err) => {
			tracing::warn!(error = %err, "Secondary geocoding attempt failed.");

			None
		},
	}
}

async fn fetch_json(client: &Client, url: &str, query: &[(&str, &str)]) -> Result<Value> {
	let res = client.get(url).query(query).send().await?;
	let json = res.error_for_status()?.json().await?;

	Ok(json)
}

fn parse_primary(json: &Value) -> Option<Coordinate> {
	let first = json.as_array()?.first()?;
	let lat = component(first.get("lat")?)?;
	let lon = component(first.get("lon")?)?;

	Some(Coordinate { lon, lat })
}

fn parse_secondary(json: &Value) -> Option<Coordinate> {
	let coords = json
		.get("features")?
		.as_array()?
		.first()?
		.get("geometry")?
		.get("coordinates")?
		.as_array()?;
	let lon = coords.first().and_then(Value::as_f64)?;
	let lat = coords.get(1).and_then(Value::as_f64)?;

	Some(Coordinate { lon, lat })
}

// The primary provider serialises coordinates as strings.
fn component(value: &Value) -> Option<f64> {
	match value {
		Value::String(text) => text.parse().ok(),
		other => other.as_f64(),
	}
}
