//! The disk wire protocol: ASCII command lines mixed with fixed 128-byte
//! binary payloads. Command-framed, not length-prefixed: a reader must stop
//! searching for `\n` the instant it knows a binary payload is coming and
//! switch to counting bytes instead.

use std::io::{self, BufRead, Read, Write};

use crate::{
	error::{DiskError, DiskResult},
	geometry::SECTOR_SIZE,
};

pub const SECTOR_LEN: usize = SECTOR_SIZE as usize;

/// A parsed request line.
#[derive(Debug, Clone, Copy)]
pub enum Request {
	Info,
	Read { c: u32, s: u32 },
	Write { c: u32, s: u32, len: usize },
}

/// Read one line (up to and including `\n`) and parse it as a disk command.
/// Returns `Ok(None)` on clean EOF before any byte of a new command arrives.
pub fn read_request(r: &mut impl BufRead) -> DiskResult<Option<Request>> {
	let mut line = String::new();
	let n = r.read_line(&mut line)?;
	if n == 0 {
		return Ok(None);
	}
	let line = line.trim_end_matches(['\n', '\r']);
	let mut parts = line.split_whitespace();
	let cmd = parts
		.next()
		.ok_or_else(|| DiskError::Protocol("empty command line".into()))?;

	let req = match cmd {
		"I" => Request::Info,
		"R" => {
			let c = next_u32(&mut parts)?;
			let s = next_u32(&mut parts)?;
			Request::Read { c, s }
		}
		"W" => {
			let c = next_u32(&mut parts)?;
			let s = next_u32(&mut parts)?;
			let len = next_u32(&mut parts)? as usize;
			Request::Write { c, s, len }
		}
		other => return Err(DiskError::Protocol(format!("unknown command {other:?}"))),
	};
	Ok(Some(req))
}

fn next_u32<'a>(parts: &mut impl Iterator<Item = &'a str>) -> DiskResult<u32> {
	parts
		.next()
		.ok_or_else(|| DiskError::Protocol("missing argument".into()))?
		.parse()
		.map_err(|_| DiskError::Protocol("argument is not a number".into()))
}

/// Drain exactly `len` raw payload bytes off the connection.
pub fn read_payload(r: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
	let mut buf = vec![0u8; len];
	r.read_exact(&mut buf)?;
	Ok(buf)
}

pub fn write_geometry(w: &mut impl Write, cylinders: u32, sectors: u32) -> io::Result<()> {
	write!(w, "{cylinders} {sectors}\n")?;
	w.flush()
}

pub fn write_ok_sector(w: &mut impl Write, sector: &[u8; SECTOR_LEN]) -> io::Result<()> {
	w.write_all(b"1")?;
	w.write_all(sector)?;
	w.flush()
}

pub fn write_ok_byte(w: &mut impl Write) -> io::Result<()> {
	w.write_all(b"1")?;
	w.flush()
}

pub fn write_fail_byte(w: &mut impl Write) -> io::Result<()> {
	w.write_all(b"0")?;
	w.flush()
}

#[cfg(test)]
mod t {
	use std::io::Cursor;

	use super::*;

	#[test]
	fn parses_info() {
		let mut c = Cursor::new(b"I\n".to_vec());
		let req = read_request(&mut c).unwrap().unwrap();
		assert!(matches!(req, Request::Info));
	}

	#[test]
	fn parses_read() {
		let mut c = Cursor::new(b"R 3 7\n".to_vec());
		let req = read_request(&mut c).unwrap().unwrap();
		assert!(matches!(req, Request::Read { c: 3, s: 7 }));
	}

	#[test]
	fn parses_write_header() {
		let mut c = Cursor::new(b"W 0 0 5\nHELLO".to_vec());
		let req = read_request(&mut c).unwrap().unwrap();
		assert!(matches!(req, Request::Write { c: 0, s: 0, len: 5 }));
		let payload = read_payload(&mut c, 5).unwrap();
		assert_eq!(payload, b"HELLO");
	}

	#[test]
	fn rejects_unknown_command() {
		let mut c = Cursor::new(b"X\n".to_vec());
		assert!(read_request(&mut c).is_err());
	}

	#[test]
	fn eof_returns_none() {
		let mut c = Cursor::new(Vec::<u8>::new());
		assert!(read_request(&mut c).unwrap().is_none());
	}
}
