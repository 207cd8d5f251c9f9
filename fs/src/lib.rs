mod directory;
mod error;
mod fat;
mod layout;
pub mod server;
mod service;
mod superblock;
mod wire;

pub use crate::{
	error::{FsError, FsResult},
	service::{FsService, ListMode},
};
