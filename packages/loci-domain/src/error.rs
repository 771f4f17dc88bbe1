pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{path}: {message}")]
	InvalidTree { path: String, message: String },
	#[error("{message}")]
	InvalidRequest { message: String },
}
impl Error {
	pub(crate) fn tree(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidTree { path: path.into(), message: message.into() }
	}

	pub(crate) fn request(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
