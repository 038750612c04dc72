#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Address could not be resolved: {address:?}.")]
	UnresolvableAddress { address: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Index error: {message}")]
	Index { message: String },
}
impl From<giro_providers::Error> for Error {
	fn from(err: giro_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<giro_storage::Error> for Error {
	fn from(err: giro_storage::Error) -> Self {
		match err {
			giro_storage::Error::Qdrant(_) => Self::Index { message: err.to_string() },
			_ => Self::Storage { message: err.to_string() },
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
