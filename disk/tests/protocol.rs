use std::{
	io::{Read, Write},
	net::{TcpListener, TcpStream},
	sync::{atomic::AtomicBool, Arc},
	thread,
};

use csfs_disk::{Arm, DiskImage, Geometry};
use tempfile::NamedTempFile;

/// Spins up a disk service on an ephemeral port and returns its address.
fn spawn_server(cylinders: u32, sectors: u32, track_us: u64) -> (std::net::SocketAddr, NamedTempFile) {
	let f = NamedTempFile::new().unwrap();
	let geometry = Geometry::new(cylinders, sectors).unwrap();
	let image = DiskImage::open(f.path(), geometry).unwrap();
	let arm = Arc::new(Arm::new(image, track_us));

	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let stop = Arc::new(AtomicBool::new(false));
	thread::spawn(move || csfs_disk::server::serve(listener, arm, stop));
	(addr, f)
}

#[test]
fn info_reports_configured_geometry() {
	let (addr, _f) = spawn_server(4, 4, 0);
	let mut conn = TcpStream::connect(addr).unwrap();
	conn.write_all(b"I\n").unwrap();
	let mut buf = [0u8; 16];
	let n = conn.read(&mut buf).unwrap();
	assert_eq!(&buf[..n], b"4 4\n");
}

#[test]
fn write_then_read_round_trips() {
	let (addr, _f) = spawn_server(4, 4, 0);
	let mut conn = TcpStream::connect(addr).unwrap();

	conn.write_all(b"W 0 0 5\nHELLO").unwrap();
	let mut status = [0u8; 1];
	conn.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"1");

	conn.write_all(b"R 0 0\n").unwrap();
	conn.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"1");
	let mut sector = [0u8; 128];
	conn.read_exact(&mut sector).unwrap();
	assert_eq!(&sector[..5], b"HELLO");
	assert!(sector[5..].iter().all(|&b| b == 0));
}

#[test]
fn invalid_coordinate_read_replies_zero_byte() {
	let (addr, _f) = spawn_server(4, 4, 0);
	let mut conn = TcpStream::connect(addr).unwrap();
	conn.write_all(b"R 4 0\n").unwrap();
	let mut status = [0u8; 1];
	conn.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"0");
}

#[test]
fn oversized_write_is_rejected() {
	let (addr, _f) = spawn_server(4, 4, 0);
	let mut conn = TcpStream::connect(addr).unwrap();
	conn.write_all(b"W 0 0 200\n").unwrap();
	let mut status = [0u8; 1];
	conn.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"0");
}

#[test]
fn two_clients_are_serialized_but_independent() {
	let (addr, _f) = spawn_server(4, 4, 0);
	let mut a = TcpStream::connect(addr).unwrap();
	let mut b = TcpStream::connect(addr).unwrap();

	a.write_all(b"W 0 0 3\nAAA").unwrap();
	b.write_all(b"W 0 1 3\nBBB").unwrap();

	let mut status = [0u8; 1];
	a.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"1");
	b.read_exact(&mut status).unwrap();
	assert_eq!(&status, b"1");

	a.write_all(b"R 0 0\n").unwrap();
	a.read_exact(&mut status).unwrap();
	let mut sector = [0u8; 128];
	a.read_exact(&mut sector).unwrap();
	assert_eq!(&sector[..3], b"AAA");

	b.write_all(b"R 0 1\n").unwrap();
	b.read_exact(&mut status).unwrap();
	b.read_exact(&mut sector).unwrap();
	assert_eq!(&sector[..3], b"BBB");
}
