use std::{
	sync::Mutex,
	thread,
	time::Duration,
};

use crate::{geometry::Geometry, image::DiskImage};

/// The single shared disk arm: its current cylinder plus the backing image,
/// both behind one mutex so that seek, arm update and sector access happen
/// as one atomic step across all connections.
pub struct Arm {
	track_us: u64,
	state:    Mutex<ArmState>,
}

struct ArmState {
	cylinder: u32,
	image:    DiskImage,
}

impl Arm {
	pub fn new(image: DiskImage, track_us: u64) -> Self {
		Self {
			track_us,
			state: Mutex::new(ArmState { cylinder: 0, image }),
		}
	}

	pub fn geometry(&self) -> Geometry {
		self.state.lock().unwrap().image.geometry()
	}

	/// Seek to cylinder `c` (sleeping `|c - h| * track_us` microseconds),
	/// then read sector `idx`'s current contents into `out`.
	pub fn read(&self, c: u32, idx: u64, out: &mut [u8; 128]) {
		let mut st = self.state.lock().unwrap();
		self.seek_locked(&mut st, c);
		out.copy_from_slice(st.image.read_sector(idx));
	}

	/// Seek to cylinder `c`, then write `data` into sector `idx` and flush.
	pub fn write(&self, c: u32, idx: u64, data: &[u8; 128]) {
		let mut st = self.state.lock().unwrap();
		self.seek_locked(&mut st, c);
		st.image.write_sector(idx, data);
		// best-effort; a flush failure here has no protocol-level way to be
		// reported back beyond the '1' already implied by having seeked
		// successfully, so it is logged and otherwise swallowed.
		if let Err(e) = st.image.flush() {
			log::error!("failed to flush backing file: {e}");
		}
	}

	fn seek_locked(&self, st: &mut ArmState, c: u32) {
		let distance = (c as i64 - st.cylinder as i64).unsigned_abs();
		if distance > 0 && self.track_us > 0 {
			// Best-effort: a spurious EINTR-style wakeup just means a
			// slightly shorter simulated seek, which is harmless.
			thread::sleep(Duration::from_micros(distance * self.track_us));
		}
		st.cylinder = c;
	}
}

#[cfg(test)]
mod t {
	use tempfile::NamedTempFile;

	use super::*;
	use crate::geometry::Geometry;

	#[test]
	fn read_write_round_trip() {
		let f = NamedTempFile::new().unwrap();
		let g = Geometry::new(4, 4).unwrap();
		let img = DiskImage::open(f.path(), g).unwrap();
		let arm = Arm::new(img, 0);

		let mut buf = [0u8; 128];
		buf[..5].copy_from_slice(b"HELLO");
		arm.write(0, 0, &buf);

		let mut out = [0u8; 128];
		arm.read(0, 0, &mut out);
		assert_eq!(out, buf);
	}

	#[test]
	fn seek_updates_cylinder_without_blocking_when_track_us_zero() {
		let f = NamedTempFile::new().unwrap();
		let g = Geometry::new(4, 4).unwrap();
		let img = DiskImage::open(f.path(), g).unwrap();
		let arm = Arm::new(img, 0);
		let mut out = [0u8; 128];
		arm.read(3, 12, &mut out);
		assert_eq!(arm.state.lock().unwrap().cylinder, 3);
	}
}
