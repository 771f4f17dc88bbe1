pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<loci_domain::Error> for Error {
	fn from(err: loci_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<loci_storage::Error> for Error {
	fn from(err: loci_storage::Error) -> Self {
		match err {
			loci_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			loci_storage::Error::UnsupportedColumn { .. }
			| loci_storage::Error::InvalidArgument(_) => Self::Storage { message: err.to_string() },
			loci_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<loci_providers::Error> for Error {
	fn from(err: loci_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
