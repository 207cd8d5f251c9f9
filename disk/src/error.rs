use std::io;

/// Errors the disk service can run into, split along the lines the protocol
/// design draws between configuration, transport, protocol and I/O failure.
#[derive(thiserror::Error, Debug)]
pub enum DiskError {
	#[error("invalid geometry: {0}")]
	InvalidGeometry(String),

	#[error("backing file error: {0}")]
	Backing(#[from] io::Error),

	#[error("malformed command line: {0}")]
	Protocol(String),

	#[error("sector address out of range")]
	OutOfRange,

	#[error("connection closed")]
	Closed,
}

pub type DiskResult<T> = Result<T, DiskError>;

impl From<DiskError> for io::Error {
	fn from(e: DiskError) -> Self {
		match e {
			DiskError::Backing(e) => e,
			other => io::Error::new(io::ErrorKind::Other, other.to_string()),
		}
	}
}
