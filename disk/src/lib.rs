mod arm;
mod client;
mod error;
mod geometry;
mod image;
pub mod server;
mod wire;

pub use crate::{
	arm::Arm,
	client::DiskClient,
	error::{DiskError, DiskResult},
	geometry::{Geometry, SECTOR_SIZE},
	image::DiskImage,
};
