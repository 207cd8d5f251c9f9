use bincode::{Decode, Encode};

use crate::layout::Layout;

/// Magic tag identifying a formatted CSFS volume.
pub const MAGIC: [u8; 5] = *b"CSFS1";

pub fn bincode_config() -> bincode::config::Configuration<bincode::config::LittleEndian, bincode::config::Fixint> {
	bincode::config::standard()
		.with_little_endian()
		.with_fixed_int_encoding()
}

/// Sector 0 of a formatted volume: magic tag plus the layout constants
/// needed to reconstruct `Layout` without recomputing it from geometry.
/// Recomputing from geometry would also work, since layout is a pure
/// function of geometry, but persisting it makes the on-disk format
/// self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Superblock {
	pub magic:         [u8; 5],
	pub total_blocks:  u32,
	pub fat_start:     u32,
	pub fat_sectors:   u32,
	pub dir_start:     u32,
	pub dir_sectors:   u32,
	pub dir_capacity:  u32,
}

impl Superblock {
	pub fn new(layout: &Layout, dir_capacity: u32) -> Self {
		Self {
			magic: MAGIC,
			total_blocks: layout.total_blocks,
			fat_start: layout.fat_start,
			fat_sectors: layout.fat_sectors,
			dir_start: layout.dir_start,
			dir_sectors: layout.dir_sectors,
			dir_capacity,
		}
	}

	pub fn is_valid(&self) -> bool {
		self.magic == MAGIC
	}

	pub fn layout(&self) -> Layout {
		Layout {
			total_blocks: self.total_blocks,
			fat_start:    self.fat_start,
			fat_sectors:  self.fat_sectors,
			dir_start:    self.dir_start,
			dir_sectors:  self.dir_sectors,
			data_start:   self.dir_start + self.dir_sectors,
		}
	}

	/// Encode into a zero-padded 128-byte sector.
	pub fn to_sector(&self) -> [u8; 128] {
		let mut buf = [0u8; 128];
		let n = bincode::encode_into_slice(self, &mut buf, bincode_config())
			.expect("Superblock must fit in one sector");
		debug_assert!(n <= 128);
		buf
	}

	/// Decode from a 128-byte sector. Returns `None` if the magic tag isn't
	/// present: a volume is considered formatted only if sector 0 carries
	/// the magic tag *and* a parseable superblock.
	pub fn from_sector(sector: &[u8; 128]) -> Option<Self> {
		let (sb, _): (Self, usize) = bincode::decode_from_slice(sector, bincode_config()).ok()?;
		if sb.is_valid() {
			Some(sb)
		} else {
			None
		}
	}
}
