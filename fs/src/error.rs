use csfs_disk::DiskError;

/// Errors the filesystem service can run into. `code()` maps each variant to
/// its wire reply code: `1` for semantic failures the client caused, `2` for
/// resource/IO failures.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
	#[error("filesystem is not formatted")]
	NotFormatted,

	#[error("geometry too small to hold metadata plus one data block")]
	GeometryTooSmall,

	#[error("name already exists")]
	NameExists,

	#[error("name not found")]
	NotFound,

	#[error("invalid filename")]
	InvalidName,

	#[error("directory is full")]
	DirectoryFull,

	#[error("not enough free blocks")]
	OutOfSpace,

	#[error("disk I/O error: {0}")]
	Disk(#[from] DiskError),

	#[error("protocol error: {0}")]
	Protocol(String),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
	/// The single-digit reply code this error maps to on the wire.
	pub fn code(&self) -> u8 {
		match self {
			FsError::NameExists | FsError::NotFound | FsError::InvalidName => 1,
			FsError::NotFormatted
			| FsError::GeometryTooSmall
			| FsError::DirectoryFull
			| FsError::OutOfSpace
			| FsError::Disk(_)
			| FsError::Protocol(_) => 2,
		}
	}
}
