use std::{fs::File, path::Path};

use memmap2::MmapMut;

use crate::{
	error::DiskResult,
	geometry::{Geometry, SECTOR_SIZE},
};

/// The persistent backing store for a disk service: a regular file of
/// exactly `geometry.byte_len()` bytes, memory-mapped read/write and shared.
/// Created and zero-extended if absent; sectors of a fresh file are
/// implicitly zero.
pub struct DiskImage {
	geometry: Geometry,
	mmap:     MmapMut,
}

impl DiskImage {
	pub fn open(path: &Path, geometry: Geometry) -> DiskResult<Self> {
		let file = File::options()
			.read(true)
			.write(true)
			.create(true)
			.open(path)?;
		file.set_len(geometry.byte_len())?;

		let mmap = unsafe { MmapMut::map_mut(&file)? };
		Ok(Self { geometry, mmap })
	}

	pub fn geometry(&self) -> Geometry {
		self.geometry
	}

	/// Contents of sector `idx`, always exactly `SECTOR_SIZE` bytes.
	pub fn read_sector(&self, idx: u64) -> &[u8] {
		let off = self.geometry.offset_of(idx) as usize;
		&self.mmap[off..off + SECTOR_SIZE as usize]
	}

	/// Overwrite sector `idx` with exactly `SECTOR_SIZE` bytes.
	pub fn write_sector(&mut self, idx: u64, data: &[u8]) {
		debug_assert_eq!(data.len(), SECTOR_SIZE as usize);
		let off = self.geometry.offset_of(idx) as usize;
		self.mmap[off..off + SECTOR_SIZE as usize].copy_from_slice(data);
	}

	/// Flush the mapping to disk. Called after every write so that a SIGINT
	/// between replies still leaves every acknowledged write observable on
	/// restart.
	pub fn flush(&self) -> DiskResult<()> {
		self.mmap.flush()?;
		Ok(())
	}
}

#[cfg(test)]
mod t {
	use tempfile::NamedTempFile;

	use super::*;

	fn harness() -> (NamedTempFile, DiskImage) {
		let f = NamedTempFile::new().unwrap();
		let g = Geometry::new(4, 4).unwrap();
		let img = DiskImage::open(f.path(), g).unwrap();
		(f, img)
	}

	#[test]
	fn fresh_sectors_are_zero() {
		let (_f, img) = harness();
		assert_eq!(img.read_sector(0), &[0u8; 128][..]);
	}

	#[test]
	fn write_then_read_round_trips() {
		let (_f, mut img) = harness();
		let mut buf = [0u8; 128];
		buf[..5].copy_from_slice(b"HELLO");
		img.write_sector(3, &buf);
		assert_eq!(img.read_sector(3), &buf[..]);
		// untouched sectors stay zero
		assert_eq!(img.read_sector(2), &[0u8; 128][..]);
	}

	#[test]
	fn survives_reopen() {
		let f = NamedTempFile::new().unwrap();
		let g = Geometry::new(4, 4).unwrap();
		{
			let mut img = DiskImage::open(f.path(), g).unwrap();
			let mut buf = [0x42u8; 128];
			buf[0] = 1;
			img.write_sector(5, &buf);
			img.flush().unwrap();
		}
		let img = DiskImage::open(f.path(), g).unwrap();
		assert_eq!(img.read_sector(5)[0], 1);
		assert_eq!(img.read_sector(5)[1], 0x42);
	}
}
