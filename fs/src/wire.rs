//! The filesystem client protocol: ASCII command lines, with `R` and `W`
//! framing a raw payload by an explicit length rather than a `\n`
//! terminator. Mirrors `csfs_disk::wire` in shape: parsing lives here so the
//! exact same framing is shared between `server.rs` and anything that wants
//! to drive the protocol from tests without going through a real socket.

use std::io::{self, BufRead, Read, Write};

use crate::{
	error::{FsError, FsResult},
	service::ListMode,
};

/// A parsed request line. `Write`'s payload is read separately by the
/// caller once it knows `len`, exactly as the disk wire module defers
/// payload reads to `read_payload`.
#[derive(Debug, Clone)]
pub enum Request {
	Format,
	Create { name: String },
	Delete { name: String },
	List { mode: ListMode },
	Read { name: String },
	Write { name: String, len: usize },
}

/// Read one line and parse it as a filesystem command. `Ok(None)` on clean
/// EOF before any byte of a new command arrives.
pub fn read_request(r: &mut impl BufRead) -> FsResult<Option<Request>> {
	let mut line = String::new();
	let n = r.read_line(&mut line).map_err(|e| FsError::Protocol(e.to_string()))?;
	if n == 0 {
		return Ok(None);
	}
	let line = line.trim_end_matches(['\n', '\r']);
	let mut parts = line.splitn(2, ' ');
	let cmd = parts.next().ok_or_else(|| FsError::Protocol("empty command line".into()))?;
	let rest = parts.next().unwrap_or("").trim();

	let req = match cmd {
		"F" => Request::Format,
		"C" => Request::Create { name: require_name(rest)? },
		"D" => Request::Delete { name: require_name(rest)? },
		"L" => {
			let b: u8 = rest
				.parse()
				.map_err(|_| FsError::Protocol("L requires a 0/1 argument".into()))?;
			let mode = match b {
				0 => ListMode::NamesOnly,
				1 => ListMode::WithLengths,
				_ => return Err(FsError::Protocol(format!("L argument must be 0 or 1, got {b}"))),
			};
			Request::List { mode }
		}
		"R" => Request::Read { name: require_name(rest)? },
		"W" => {
			let mut wp = rest.rsplitn(2, ' ');
			let len_str = wp.next().ok_or_else(|| FsError::Protocol("W requires a length".into()))?;
			let name = wp.next().unwrap_or("");
			let len: usize = len_str
				.parse()
				.map_err(|_| FsError::Protocol("W length is not a number".into()))?;
			Request::Write { name: require_name(name)?, len }
		}
		other => return Err(FsError::Protocol(format!("unknown command {other:?}"))),
	};
	Ok(Some(req))
}

fn require_name(s: &str) -> FsResult<String> {
	if s.is_empty() {
		return Err(FsError::Protocol("missing name argument".into()));
	}
	Ok(s.to_string())
}

/// Drain exactly `len` raw payload bytes off the connection (used for `W`).
pub fn read_payload(r: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
	let mut buf = vec![0u8; len];
	r.read_exact(&mut buf)?;
	Ok(buf)
}

pub fn write_code(w: &mut impl Write, code: u8) -> io::Result<()> {
	write!(w, "{code}\n")?;
	w.flush()
}

pub fn write_unformatted_notice(w: &mut impl Write) -> io::Result<()> {
	writeln!(w, "(unformatted)")?;
	w.flush()
}

pub fn write_listing(w: &mut impl Write, mode: ListMode, entries: &[(String, u32)]) -> io::Result<()> {
	for (name, len) in entries {
		match mode {
			ListMode::NamesOnly => writeln!(w, "{name}")?,
			ListMode::WithLengths => writeln!(w, "{name} {len}")?,
		}
	}
	w.flush()
}

/// `"<code> <len> " + data + "\n"`, the `R` reply shape.
pub fn write_read_reply(w: &mut impl Write, code: u8, data: &[u8]) -> io::Result<()> {
	write!(w, "{code} {} ", data.len())?;
	w.write_all(data)?;
	w.write_all(b"\n")?;
	w.flush()
}
