use bincode::{Decode, Encode};
use csfs_disk::DiskClient;

use crate::{
	error::{FsError, FsResult},
	layout::{Layout, DIR_CAPACITY},
	superblock::bincode_config,
};

/// One 64-byte directory entry. Name is a NUL-padded fixed array; `used == 0`
/// marks a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DirEntry {
	name:             [u8; 32],
	pub length:       u32,
	pub first:        u32,
	pub used:         u8,
	_reserved:        [u8; 23],
}

impl DirEntry {
	pub const EMPTY: DirEntry =
		DirEntry { name: [0u8; 32], length: 0, first: crate::fat::EOF, used: 0, _reserved: [0u8; 23] };

	pub fn new(name: &str, first: u32) -> FsResult<Self> {
		let bytes = name.as_bytes();
		if bytes.is_empty() || bytes.len() > 31 {
			return Err(FsError::InvalidName);
		}
		let mut buf = [0u8; 32];
		buf[..bytes.len()].copy_from_slice(bytes);
		Ok(Self { name: buf, length: 0, first, used: 1, _reserved: [0u8; 23] })
	}

	pub fn is_used(&self) -> bool {
		self.used != 0
	}

	pub fn name(&self) -> &str {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}
}

/// The fixed-capacity directory table: 64 slots, two per 128-byte sector.
pub struct DirectoryTable {
	entries: Vec<DirEntry>,
}

impl DirectoryTable {
	pub fn format() -> Self {
		Self { entries: vec![DirEntry::EMPTY; DIR_CAPACITY as usize] }
	}

	pub fn load(disk: &mut DiskClient, layout: &Layout) -> FsResult<Self> {
		let mut entries = Vec::with_capacity(DIR_CAPACITY as usize);
		for sector_off in 0..layout.dir_sectors {
			let sector = disk.read_block((layout.dir_start + sector_off) as u64)?;
			for half in sector.chunks_exact(64) {
				let (entry, _): (DirEntry, usize) =
					bincode::decode_from_slice(half, bincode_config()).map_err(|e| {
						FsError::Protocol(format!("corrupt directory entry: {e}"))
					})?;
				entries.push(entry);
			}
		}
		entries.truncate(DIR_CAPACITY as usize);
		Ok(Self { entries })
	}

	pub fn entries(&self) -> &[DirEntry] {
		&self.entries
	}

	pub fn find_by_name(&self, name: &str) -> Option<usize> {
		self.entries.iter().position(|e| e.is_used() && e.name() == name)
	}

	pub fn find_free_slot(&self) -> Option<usize> {
		self.entries.iter().position(|e| !e.is_used())
	}

	pub fn set(&mut self, slot: usize, entry: DirEntry) {
		self.entries[slot] = entry;
	}

	pub fn get(&self, slot: usize) -> &DirEntry {
		&self.entries[slot]
	}

	/// Write back only the sector containing `slot`.
	pub fn flush_slot(&self, disk: &mut DiskClient, layout: &Layout, slot: usize) -> FsResult<()> {
		self.flush_sector(disk, layout, slot / 2)
	}

	fn flush_sector(&self, disk: &mut DiskClient, layout: &Layout, sector_off: usize) -> FsResult<()> {
		let mut sector = [0u8; 128];
		for (i, half) in sector.chunks_exact_mut(64).enumerate() {
			let entry_idx = sector_off * 2 + i;
			let entry = self.entries.get(entry_idx).copied().unwrap_or(DirEntry::EMPTY);
			let n = bincode::encode_into_slice(&entry, half, bincode_config())
				.expect("DirEntry must fit in 64 bytes");
			debug_assert!(n <= 64);
		}
		disk.write_block((layout.dir_start + sector_off as u32) as u64, &sector)?;
		Ok(())
	}

	/// Zero every directory sector.
	pub fn flush_all(&self, disk: &mut DiskClient, layout: &Layout) -> FsResult<()> {
		for sector_off in 0..(layout.dir_sectors as usize) {
			self.flush_sector(disk, layout, sector_off)?;
		}
		Ok(())
	}
}
