use std::sync::Mutex;

use csfs_disk::DiskClient;

use crate::{
	directory::{DirEntry, DirectoryTable},
	error::{FsError, FsResult},
	fat::{self, Fat},
	layout::{Layout, DIR_CAPACITY},
	superblock::Superblock,
};

/// `b` argument to `L`: `0` lists names only, `1` lists names with lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
	NamesOnly,
	WithLengths,
}

enum State {
	Unformatted,
	Formatted { layout: Layout, fat: Fat, dir: DirectoryTable },
}

/// The filesystem service's metadata: FAT cache, directory view, layout and
/// the formatted flag, all behind one mutex. Each caller brings its own
/// `DiskClient`; the service itself holds no disk connection.
pub struct FsService {
	state: Mutex<State>,
}

impl Default for FsService {
	fn default() -> Self {
		Self::new()
	}
}

impl FsService {
	pub fn new() -> Self {
		Self { state: Mutex::new(State::Unformatted) }
	}

	/// `F`: compute layout, write the superblock, reset the FAT and
	/// directory.
	pub fn format(&self, disk: &mut DiskClient) -> FsResult<()> {
		let mut state = self.state.lock().unwrap();

		let layout = Layout::compute(disk.geometry())?;
		let sb = Superblock::new(&layout, DIR_CAPACITY);
		disk.write_block(0, &sb.to_sector())?;

		let mut fat = Fat::format(&layout);
		fat.flush(disk, &layout)?;

		let dir = DirectoryTable::format();
		dir.flush_all(disk, &layout)?;

		*state = State::Formatted { layout, fat, dir };
		Ok(())
	}

	/// Detect lazy formatting on first use: if the in-memory state is still
	/// `Unformatted`, try to read sector 0 and adopt it if it carries a
	/// valid superblock. Racing workers may both take this path; both will
	/// compute the identical `Formatted` state, so the last write under the
	/// mutex wins harmlessly.
	fn ensure_formatted<'a>(&self, state: &'a mut State, disk: &mut DiskClient) -> FsResult<()> {
		if matches!(state, State::Formatted { .. }) {
			return Ok(());
		}
		let sector = disk.read_block(0)?;
		let Some(sb) = Superblock::from_sector(&sector) else {
			return Err(FsError::NotFormatted);
		};
		let layout = sb.layout();
		let fat = Fat::load(disk, &layout)?;
		let dir = DirectoryTable::load(disk, &layout)?;
		*state = State::Formatted { layout, fat, dir };
		Ok(())
	}

	/// `C name`: create an empty file.
	pub fn create(&self, disk: &mut DiskClient, name: &str) -> FsResult<()> {
		if name.is_empty() || name.len() >= 32 {
			return Err(FsError::InvalidName);
		}
		let mut state = self.state.lock().unwrap();
		self.ensure_formatted(&mut state, disk)?;
		let State::Formatted { layout, dir, .. } = &mut state else { unreachable!() };

		if dir.find_by_name(name).is_some() {
			return Err(FsError::NameExists);
		}
		let slot = dir.find_free_slot().ok_or(FsError::DirectoryFull)?;
		let entry = DirEntry::new(name, fat::EOF)?;
		dir.set(slot, entry);
		dir.flush_slot(disk, layout, slot)?;
		Ok(())
	}

	/// `D name`: delete a file, freeing its chain.
	pub fn delete(&self, disk: &mut DiskClient, name: &str) -> FsResult<()> {
		let mut state = self.state.lock().unwrap();
		self.ensure_formatted(&mut state, disk)?;
		let State::Formatted { layout, fat, dir } = &mut state else { unreachable!() };

		let slot = dir.find_by_name(name).ok_or(FsError::NotFound)?;
		let first = dir.get(slot).first;
		fat.free_chain(layout, first);
		fat.flush(disk, layout)?;
		dir.set(slot, DirEntry::EMPTY);
		dir.flush_slot(disk, layout, slot)?;
		Ok(())
	}

	/// `L b`: list directory entries. Returns `None` if the volume is
	/// unformatted (rendered by the caller as `"(unformatted)\n"`).
	pub fn list(&self, disk: &mut DiskClient, mode: ListMode) -> FsResult<Option<Vec<(String, u32)>>> {
		let mut state = self.state.lock().unwrap();
		if self.ensure_formatted(&mut state, disk).is_err() {
			return Ok(None);
		}
		let State::Formatted { dir, .. } = &state else { unreachable!() };

		let out = dir
			.entries()
			.iter()
			.filter(|e| e.is_used())
			.map(|e| (e.name().to_string(), if mode == ListMode::WithLengths { e.length } else { 0 }))
			.collect();
		Ok(Some(out))
	}

	/// `R name`: read a file's full contents.
	pub fn read_file(&self, disk: &mut DiskClient, name: &str) -> FsResult<Vec<u8>> {
		let mut state = self.state.lock().unwrap();
		self.ensure_formatted(&mut state, disk)?;
		let State::Formatted { fat, dir, .. } = &state else { unreachable!() };

		let slot = dir.find_by_name(name).ok_or(FsError::NotFound)?;
		let entry = dir.get(slot);
		let mut out = Vec::with_capacity(entry.length as usize);
		let mut remaining = entry.length as usize;
		let mut cur = entry.first;
		while remaining > 0 {
			let block = disk.read_block(cur as u64)?;
			let take = remaining.min(block.len());
			out.extend_from_slice(&block[..take]);
			remaining -= take;
			cur = fat.get(cur);
		}
		Ok(out)
	}

	/// `W name len` + payload: overwrite a file's contents.
	pub fn write_file(&self, disk: &mut DiskClient, name: &str, data: &[u8]) -> FsResult<()> {
		let mut state = self.state.lock().unwrap();
		self.ensure_formatted(&mut state, disk)?;
		let State::Formatted { layout, fat, dir } = &mut state else { unreachable!() };

		let slot = dir.find_by_name(name).ok_or(FsError::NotFound)?;
		let old_first = dir.get(slot).first;
		fat.free_chain(layout, old_first);

		if data.is_empty() {
			fat.flush(disk, layout)?;
			let mut entry = *dir.get(slot);
			entry.first = fat::EOF;
			entry.length = 0;
			dir.set(slot, entry);
			dir.flush_slot(disk, layout, slot)?;
			return Ok(());
		}

		let block_size = 128usize;
		let needed = ((data.len() + block_size - 1) / block_size) as u32;
		let Some(head) = fat.alloc_chain(layout, needed) else {
			// Old chain is already freed; flush that and leave the entry
			// empty so the file is at least internally consistent, then
			// report out-of-space.
			fat.flush(disk, layout)?;
			let mut entry = *dir.get(slot);
			entry.first = fat::EOF;
			entry.length = 0;
			dir.set(slot, entry);
			dir.flush_slot(disk, layout, slot)?;
			return Err(FsError::OutOfSpace);
		};

		let blocks = fat.chain_blocks(head);
		for (i, &block_idx) in blocks.iter().enumerate() {
			let mut sector = [0u8; 128];
			let start = i * block_size;
			let end = (start + block_size).min(data.len());
			sector[..end - start].copy_from_slice(&data[start..end]);
			disk.write_block(block_idx as u64, &sector)?;
		}

		fat.flush(disk, layout)?;
		let mut entry = *dir.get(slot);
		entry.first = head;
		entry.length = data.len() as u32;
		dir.set(slot, entry);
		dir.flush_slot(disk, layout, slot)?;
		Ok(())
	}
}

#[cfg(test)]
mod t {
	use csfs_disk::{DiskClient, DiskImage, Geometry};
	use tempfile::NamedTempFile;

	use super::*;

	/// An in-process stand-in for `DiskClient` is not practical since
	/// `DiskClient` only speaks the wire protocol; these tests drive the
	/// real thing over a loopback connection to a disk service spawned for
	/// the duration of the test, exactly like the fs crate's own
	/// `tests/service.rs` integration suite.
	fn harness(cylinders: u32, sectors: u32) -> (DiskClient, NamedTempFile, std::net::TcpListener) {
		let f = NamedTempFile::new().unwrap();
		let geometry = Geometry::new(cylinders, sectors).unwrap();
		let image = DiskImage::open(f.path(), geometry).unwrap();
		let arm = std::sync::Arc::new(csfs_disk::Arm::new(image, 0));
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		let listener_clone = listener.try_clone().unwrap();
		let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
		std::thread::spawn(move || csfs_disk::server::serve(listener_clone, arm, stop));
		let client = DiskClient::connect(addr).unwrap();
		(client, f, listener)
	}

	#[test]
	fn format_then_list_is_empty() {
		let (mut disk, _f, _l) = harness(16, 16);
		let svc = FsService::new();
		svc.format(&mut disk).unwrap();
		let names = svc.list(&mut disk, ListMode::NamesOnly).unwrap().unwrap();
		assert!(names.is_empty());
	}

	#[test]
	fn create_is_idempotent_failure_on_second_call() {
		let (mut disk, _f, _l) = harness(16, 16);
		let svc = FsService::new();
		svc.format(&mut disk).unwrap();
		svc.create(&mut disk, "foo").unwrap();
		assert!(matches!(svc.create(&mut disk, "foo"), Err(FsError::NameExists)));
	}

	#[test]
	fn write_read_delete_round_trip() {
		let (mut disk, _f, _l) = harness(16, 16);
		let svc = FsService::new();
		svc.format(&mut disk).unwrap();
		svc.create(&mut disk, "foo").unwrap();
		svc.write_file(&mut disk, "foo", b"hello world!").unwrap();
		let data = svc.read_file(&mut disk, "foo").unwrap();
		assert_eq!(data, b"hello world!");

		svc.delete(&mut disk, "foo").unwrap();
		assert!(matches!(svc.read_file(&mut disk, "foo"), Err(FsError::NotFound)));
	}

	#[test]
	fn multi_block_chain_round_trips() {
		let (mut disk, _f, _l) = harness(16, 16);
		let svc = FsService::new();
		svc.format(&mut disk).unwrap();
		svc.create(&mut disk, "big").unwrap();
		let payload = vec![0xABu8; 300];
		svc.write_file(&mut disk, "big", &payload).unwrap();
		let data = svc.read_file(&mut disk, "big").unwrap();
		assert_eq!(data, payload);
	}

	#[test]
	fn list_unformatted_returns_none() {
		let (mut disk, _f, _l) = harness(16, 16);
		let svc = FsService::new();
		assert!(svc.list(&mut disk, ListMode::NamesOnly).unwrap().is_none());
	}
}
