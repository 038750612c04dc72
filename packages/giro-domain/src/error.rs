pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid record: {message}")]
	InvalidRecord { message: String },
	#[error("Key column {key:?} is not present in both snapshots.")]
	MissingKeyColumn { key: String },
	#[error("{message}")]
	InvalidInput { message: String },
	#[error(transparent)]
	Csv(#[from] csv::Error),
}
