use std::{
	io::{BufRead, BufReader, Read, Write},
	net::{TcpStream, ToSocketAddrs},
};

use crate::{
	error::{DiskError, DiskResult},
	geometry::{Geometry, SECTOR_SIZE},
};

/// The disk-connection helper: one TCP connection per owner, used only to
/// issue `I` once at startup and then `R`/`W` by absolute block index. Not
/// `Clone`: each filesystem worker owns exactly one of these for its
/// lifetime.
pub struct DiskClient {
	reader:   BufReader<TcpStream>,
	writer:   TcpStream,
	geometry: Geometry,
}

impl DiskClient {
	pub fn connect(addr: impl ToSocketAddrs) -> DiskResult<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_nodelay(true).ok();
		let writer = stream.try_clone()?;
		let mut reader = BufReader::new(stream);

		writer.try_clone()?.write_all(b"I\n")?;
		let mut line = String::new();
		reader.read_line(&mut line)?;
		let mut parts = line.trim_end().split_whitespace();
		let cylinders: u32 = parts
			.next()
			.ok_or_else(|| DiskError::Protocol("missing cylinder count in I reply".into()))?
			.parse()
			.map_err(|_| DiskError::Protocol("bad cylinder count in I reply".into()))?;
		let sectors: u32 = parts
			.next()
			.ok_or_else(|| DiskError::Protocol("missing sector count in I reply".into()))?
			.parse()
			.map_err(|_| DiskError::Protocol("bad sector count in I reply".into()))?;
		let geometry = Geometry::new(cylinders, sectors)?;

		Ok(Self { reader, writer, geometry })
	}

	pub fn geometry(&self) -> Geometry {
		self.geometry
	}

	pub fn block_count(&self) -> u64 {
		self.geometry.sector_count()
	}

	/// Read block `idx`, expecting `'1'` followed by 128 raw bytes.
	pub fn read_block(&mut self, idx: u64) -> DiskResult<[u8; SECTOR_SIZE as usize]> {
		let (c, s) = self.split(idx);
		write!(self.writer, "R {c} {s}\n")?;
		self.writer.flush()?;

		let mut status = [0u8; 1];
		self.reader.read_exact(&mut status)?;
		if status[0] != b'1' {
			return Err(DiskError::OutOfRange);
		}
		let mut buf = [0u8; SECTOR_SIZE as usize];
		self.reader.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Write block `idx`. Always transmits a full 128-byte sector: the
	/// filesystem never relies on the disk's own zero-fill.
	pub fn write_block(&mut self, idx: u64, data: &[u8; SECTOR_SIZE as usize]) -> DiskResult<()> {
		let (c, s) = self.split(idx);
		write!(self.writer, "W {c} {s} {}\n", SECTOR_SIZE)?;
		self.writer.write_all(data)?;
		self.writer.flush()?;

		let mut status = [0u8; 1];
		self.reader.read_exact(&mut status)?;
		if status[0] != b'1' {
			return Err(DiskError::OutOfRange);
		}
		Ok(())
	}

	fn split(&self, idx: u64) -> (u32, u32) {
		let sectors = self.geometry.sectors as u64;
		((idx / sectors) as u32, (idx % sectors) as u32)
	}
}
