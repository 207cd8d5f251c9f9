use std::{
	io::{BufReader, Write},
	net::{SocketAddr, TcpListener, TcpStream},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread,
};

use csfs_disk::DiskClient;

use crate::{
	error::FsError,
	service::FsService,
	wire::{self, Request},
};

/// Runs the accept loop until `stop` is set, spawning one detached worker
/// thread per accepted connection, one thread per client. Each worker opens
/// its own connection to the disk service at `disk_addr` and keeps it for
/// the connection's lifetime; all workers share one `FsService` whose
/// internal mutex serializes metadata access.
pub fn serve(listener: TcpListener, disk_addr: SocketAddr, service: Arc<FsService>, stop: Arc<AtomicBool>) {
	listener
		.set_nonblocking(true)
		.expect("fs listener: failed to set non-blocking mode");

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
		log::info!("fs: accepted connection from {peer:?}");
		let service = Arc::clone(&service);
		thread::spawn(move || match DiskClient::connect(disk_addr) {
			Ok(disk) => {
				if let Err(e) = handle_connection(stream, disk, &service) {
					log::warn!("fs: connection {peer:?} closed with error: {e}");
				} else {
					log::debug!("fs: connection {peer:?} closed");
				}
			}
			Err(e) => log::error!("fs: worker for {peer:?} could not reach disk service: {e}"),
		});
	}
}

fn handle_connection(
	stream: TcpStream,
	mut disk: DiskClient,
	service: &FsService,
) -> std::io::Result<()> {
	stream.set_nodelay(true).ok();
	let mut writer = stream.try_clone()?;
	let mut reader = BufReader::new(stream);

	loop {
		let req = match wire::read_request(&mut reader) {
			Ok(Some(req)) => req,
			Ok(None) => return Ok(()),
			Err(e) => {
				log::debug!("fs: malformed command, closing connection: {e}");
				return Ok(());
			}
		};

		match req {
			Request::Format => {
				let code = match service.format(&mut disk) {
					Ok(()) => 0,
					Err(e) => {
						log::warn!("fs: format failed: {e}");
						e.code()
					}
				};
				wire::write_code(&mut writer, code)?;
			}
			Request::Create { name } => {
				let code = match service.create(&mut disk, &name) {
					Ok(()) => 0,
					Err(e) => e.code(),
				};
				wire::write_code(&mut writer, code)?;
			}
			Request::Delete { name } => {
				let code = match service.delete(&mut disk, &name) {
					Ok(()) => 0,
					Err(e) => e.code(),
				};
				wire::write_code(&mut writer, code)?;
			}
			Request::List { mode } => match service.list(&mut disk, mode) {
				Ok(Some(entries)) => wire::write_listing(&mut writer, mode, &entries)?,
				Ok(None) => wire::write_unformatted_notice(&mut writer)?,
				Err(e) => {
					log::warn!("fs: list failed: {e}");
					wire::write_unformatted_notice(&mut writer)?
				}
			},
			Request::Read { name } => match service.read_file(&mut disk, &name) {
				Ok(data) => wire::write_read_reply(&mut writer, 0, &data)?,
				Err(FsError::NotFound) => wire::write_read_reply(&mut writer, 1, &[])?,
				Err(e) => {
					log::warn!("fs: read failed: {e}");
					wire::write_read_reply(&mut writer, e.code(), &[])?
				}
			},
			Request::Write { name, len } => {
				let payload = wire::read_payload(&mut reader, len)?;
				let code = match service.write_file(&mut disk, &name, &payload) {
					Ok(()) => 0,
					Err(e) => e.code(),
				};
				wire::write_code(&mut writer, code)?;
			}
		}
	}
}
