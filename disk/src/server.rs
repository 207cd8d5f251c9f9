use std::{
	io::{BufReader, Write},
	net::{TcpListener, TcpStream},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread,
};

use crate::{
	arm::Arm,
	geometry::SECTOR_SIZE,
	wire::{self, Request, SECTOR_LEN},
};

/// Runs the accept loop on the current thread until `stop` is set, spawning
/// one detached worker thread per accepted connection. Existing connections
/// finish on their own, since workers are otherwise independent of each
/// other and of the listener.
///
/// The listener is polled non-blocking so `stop` is rechecked every
/// iteration instead of only after the next incoming connection arrives.
pub fn serve(listener: TcpListener, arm: Arc<Arm>, stop: Arc<AtomicBool>) {
	listener
		.set_nonblocking(true)
		.expect("disk listener: failed to set non-blocking mode");

	while !stop.load(Ordering::SeqCst) {
		let stream = match listener.accept() {
			Ok((s, _addr)) => s,
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
				thread::sleep(std::time::Duration::from_millis(50));
				continue;
			}
			Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
			Err(e) => {
				log::warn!("accept() failed: {e}");
				continue;
			}
		};
		let peer = stream.peer_addr().ok();
		log::info!("disk: accepted connection from {peer:?}");
		let arm = Arc::clone(&arm);
		thread::spawn(move || {
			if let Err(e) = handle_connection(stream, &arm) {
				log::warn!("disk: connection {peer:?} closed with error: {e}");
			} else {
				log::debug!("disk: connection {peer:?} closed");
			}
		});
	}
}

fn handle_connection(stream: TcpStream, arm: &Arm) -> std::io::Result<()> {
	stream.set_nodelay(true).ok();
	let mut writer = stream.try_clone()?;
	let mut reader = BufReader::new(stream);

	loop {
		let req = match wire::read_request(&mut reader) {
			Ok(Some(req)) => req,
			Ok(None) => return Ok(()),
			Err(e) => {
				log::debug!("disk: malformed command, closing connection: {e}");
				return Ok(());
			}
		};

		match req {
			Request::Info => {
				let g = arm.geometry();
				wire::write_geometry(&mut writer, g.cylinders, g.sectors)?;
			}
			Request::Read { c, s } => {
				handle_read(arm, &mut writer, c, s)?;
			}
			Request::Write { c, s, len } => {
				handle_write(arm, &mut reader, &mut writer, c, s, len)?;
			}
		}
	}
}

fn handle_read(arm: &Arm, writer: &mut impl Write, c: u32, s: u32) -> std::io::Result<()> {
	let g = arm.geometry();
	let Some(idx) = g.linear_index(c, s) else {
		return wire::write_fail_byte(writer);
	};
	let mut buf = [0u8; SECTOR_LEN];
	arm.read(c, idx, &mut buf);
	wire::write_ok_sector(writer, &buf)
}

fn handle_write(
	arm: &Arm,
	reader: &mut impl std::io::Read,
	writer: &mut impl Write,
	c: u32,
	s: u32,
	len: usize,
) -> std::io::Result<()> {
	let g = arm.geometry();
	let valid = g.contains(c, s) && len <= SECTOR_SIZE as usize;
	if !valid {
		// Rejecting before consuming the payload desynchronizes the stream
		// for pipelined writers, so close the connection after a failed W
		// by returning an error once the reply is sent: a client that keeps
		// writing into a stale stream fails loudly instead of silently.
		wire::write_fail_byte(writer)?;
		return Err(std::io::Error::new(
			std::io::ErrorKind::InvalidData,
			"rejected W: connection desynchronized, closing",
		));
	}

	let payload = wire::read_payload(reader, len)?;
	let mut sector = [0u8; SECTOR_LEN];
	sector[..len].copy_from_slice(&payload);
	// bytes [len, SECTOR_LEN) are already zero.

	let idx = g.linear_index(c, s).expect("validated above");
	arm.write(c, idx, &sector);
	wire::write_ok_byte(writer)
}
