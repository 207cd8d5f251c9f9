use std::collections::BTreeSet;

use csfs_disk::DiskClient;

use crate::{
	error::FsResult,
	layout::{Layout, FAT_ENTRIES_PER_SECTOR},
};

pub const FREE: u32 = 0x0000_0000;
pub const RESERVED: u32 = 0xFFFF_FFFE;
pub const EOF: u32 = 0xFFFF_FFFF;

/// In-memory mirror of the on-disk FAT. Loaded lazily on first use, flushed
/// back to disk after each mutating operation. One 128-byte sector holds
/// exactly `FAT_ENTRIES_PER_SECTOR` (32) little-endian `u32` entries.
pub struct Fat {
	entries: Vec<u32>,
	dirty:   BTreeSet<u32>,
}

impl Fat {
	/// Load the full FAT from disk.
	pub fn load(disk: &mut DiskClient, layout: &Layout) -> FsResult<Self> {
		let mut entries = Vec::with_capacity(layout.total_blocks as usize);
		for sector_off in 0..layout.fat_sectors {
			let sector = disk.read_block((layout.fat_start + sector_off) as u64)?;
			for chunk in sector.chunks_exact(4) {
				entries.push(u32::from_le_bytes(chunk.try_into().unwrap()));
				if entries.len() == layout.total_blocks as usize {
					break;
				}
			}
		}
		entries.resize(layout.total_blocks as usize, FREE);
		Ok(Self { entries, dirty: BTreeSet::new() })
	}

	/// Build a freshly formatted FAT: every metadata block RESERVED (the
	/// range `[0, dir_start + dir_sectors)`), every data block FREE.
	pub fn format(layout: &Layout) -> Self {
		let mut entries = vec![FREE; layout.total_blocks as usize];
		for idx in 0..layout.data_start {
			entries[idx as usize] = RESERVED;
		}
		let dirty = (0..layout.fat_sectors).collect();
		Self { entries, dirty }
	}

	pub fn get(&self, idx: u32) -> u32 {
		self.entries[idx as usize]
	}

	fn set(&mut self, layout: &Layout, idx: u32, value: u32) {
		self.entries[idx as usize] = value;
		self.dirty.insert(idx / FAT_ENTRIES_PER_SECTOR);
		let _ = layout;
	}

	/// Persist every sector touched since the last flush.
	pub fn flush(&mut self, disk: &mut DiskClient, layout: &Layout) -> FsResult<()> {
		for &sector_off in &self.dirty {
			let base = sector_off * FAT_ENTRIES_PER_SECTOR;
			let mut sector = [0u8; 128];
			for i in 0..FAT_ENTRIES_PER_SECTOR {
				let idx = base + i;
				let value = if idx < layout.total_blocks { self.entries[idx as usize] } else { FREE };
				sector[(i * 4) as usize..(i * 4 + 4) as usize].copy_from_slice(&value.to_le_bytes());
			}
			disk.write_block((layout.fat_start + sector_off) as u64, &sector)?;
		}
		self.dirty.clear();
		Ok(())
	}

	/// Walk the chain starting at `first` and free every block in it.
	pub fn free_chain(&mut self, layout: &Layout, first: u32) {
		let mut cur = first;
		while cur != EOF {
			let next = self.get(cur);
			self.set(layout, cur, FREE);
			cur = next;
		}
	}

	/// Scan data blocks from `layout.data_start` upward and link `count`
	/// free blocks into a chain terminated by EOF, returning the chain
	/// head. Checks availability before mutating anything, so a failed
	/// allocation never leaves a partially-linked chain — the accepted
	/// degradation on out-of-space is strictly about the *old* chain having
	/// already been freed by the caller, not about this step being
	/// non-atomic.
	pub fn alloc_chain(&mut self, layout: &Layout, count: u32) -> Option<u32> {
		if count == 0 {
			return None;
		}
		let free_blocks: Vec<u32> = (layout.data_start..layout.total_blocks)
			.filter(|&idx| self.get(idx) == FREE)
			.take(count as usize)
			.collect();
		if free_blocks.len() < count as usize {
			return None;
		}

		for w in free_blocks.windows(2) {
			self.set(layout, w[0], w[1]);
		}
		let last = *free_blocks.last().unwrap();
		self.set(layout, last, EOF);

		Some(free_blocks[0])
	}

	/// Collect the block indices of a chain, in order, starting at `first`.
	pub fn chain_blocks(&self, first: u32) -> Vec<u32> {
		let mut out = Vec::new();
		let mut cur = first;
		while cur != EOF {
			out.push(cur);
			cur = self.get(cur);
		}
		out
	}
}

#[cfg(test)]
mod t {
	use super::*;

	fn layout() -> Layout {
		let g = csfs_disk::Geometry::new(16, 16).unwrap();
		Layout::compute(g).unwrap()
	}

	#[test]
	fn format_reserves_metadata_and_frees_data() {
		let layout = layout();
		let fat = Fat::format(&layout);
		for i in 0..layout.data_start {
			assert_eq!(fat.get(i), RESERVED);
		}
		for i in layout.data_start..layout.total_blocks {
			assert_eq!(fat.get(i), FREE);
		}
	}

	#[test]
	fn alloc_then_free_round_trips() {
		let layout = layout();
		let mut fat = Fat::format(&layout);
		let head = fat.alloc_chain(&layout, 3).unwrap();
		let blocks = fat.chain_blocks(head);
		assert_eq!(blocks.len(), 3);
		assert_eq!(fat.get(*blocks.last().unwrap()), EOF);

		fat.free_chain(&layout, head);
		for b in blocks {
			assert_eq!(fat.get(b), FREE);
		}
	}

	#[test]
	fn alloc_fails_cleanly_when_not_enough_free_blocks() {
		let layout = layout();
		let mut fat = Fat::format(&layout);
		let total_free = layout.data_block_count();
		assert!(fat.alloc_chain(&layout, total_free + 1).is_none());
		// nothing should have been mutated by the failed attempt
		for i in layout.data_start..layout.total_blocks {
			assert_eq!(fat.get(i), FREE);
		}
	}
}
