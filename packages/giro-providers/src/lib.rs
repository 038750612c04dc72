pub mod embedding;
pub mod geocode;
pub mod route;
pub mod throttle;

mod error;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Longitude/latitude pair, GeoJSON axis order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
	pub lon: f64,
	pub lat: f64,
}

/// Sparse embedding as produced by the sparse side of the embedding
/// service: parallel index/value arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
	pub indices: Vec<u32>,
	pub values: Vec<f32>,
}
