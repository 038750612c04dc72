use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, SparseVector};

pub async fn embed_dense(
	cfg: &giro_config::Embedding,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.dense_path);
	let body = serde_json::json!({
		"model": cfg.dense_model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client.post(url).bearer_auth(&cfg.api_key).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_dense_response(json)
}

pub async fn embed_sparse(
	cfg: &giro_config::Embedding,
	texts: &[String],
) -> Result<Vec<SparseVector>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.sparse_path);
	let body = serde_json::json!({
		"model": cfg.sparse_model,
		"input": texts,
	});
	let res = client.post(url).bearer_auth(&cfg.api_key).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_sparse_response(json)
}

fn data_array(json: &Value) -> Result<&Vec<Value>> {
	json.get("data").and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: "Embedding response is missing data array.".to_string(),
	})
}

fn parse_dense_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = data_array(&json)?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding =
			item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
				Error::InvalidResponse {
					message: "Embedding item missing embedding array.".to_string(),
				}
			})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn parse_sparse_response(json: Value) -> Result<Vec<SparseVector>> {
	let data = data_array(&json)?;
	let mut indexed: Vec<(usize, SparseVector)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let indices = u32_array(item, "indices")?;
		let values = f32_array(item, "values")?;

		if indices.len() != values.len() {
			return Err(Error::InvalidResponse {
				message: "Sparse embedding indices and values differ in length.".to_string(),
			});
		}

		indexed.push((index, SparseVector { indices, values }));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn u32_array(item: &Value, key: &str) -> Result<Vec<u32>> {
	let array = item.get(key).and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: format!("Sparse embedding item missing {key} array."),
	})?;
	let mut out = Vec::with_capacity(array.len());

	for value in array {
		let number = value.as_u64().ok_or_else(|| Error::InvalidResponse {
			message: format!("Sparse embedding {key} must be unsigned integers."),
		})?;

		out.push(number as u32);
	}

	Ok(out)
}

fn f32_array(item: &Value, key: &str) -> Result<Vec<f32>> {
	let array = item.get(key).and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: format!("Sparse embedding item missing {key} array."),
	})?;
	let mut out = Vec::with_capacity(array.len());

	for value in array {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: format!("Sparse embedding {key} must be numeric."),
		})?;

		out.push(number as f32);
	}

	Ok(out)
}
