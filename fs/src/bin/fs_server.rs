use std::{
	net::{SocketAddr, TcpListener, ToSocketAddrs},
	process::ExitCode,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use csfs_fs::FsService;

/// Flat filesystem service: serves the CSFS client protocol over TCP,
/// translating every operation into block reads and writes against a
/// separately running disk service.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
	/// TCP port to listen for filesystem clients on
	listen_port: u16,

	/// Hostname of the disk service to store blocks on
	disk_host: String,

	/// TCP port of the disk service
	disk_port: u16,

	#[command(flatten)]
	verbose: Verbosity<WarnLevel>,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.init();

	match run(&cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("fs_server: {e:#}");
			ExitCode::from(2)
		}
	}
}

fn run(cli: &Cli) -> Result<()> {
	let disk_addr = resolve_disk_addr(&cli.disk_host, cli.disk_port)?;

	let listener =
		TcpListener::bind(("0.0.0.0", cli.listen_port)).context("failed to bind listen socket")?;
	log::info!(
		"fs_server: listening on port {}, storing blocks on disk service at {disk_addr}",
		cli.listen_port
	);

	let service = Arc::new(FsService::new());
	let stop = Arc::new(AtomicBool::new(false));
	install_sigint_handler(Arc::clone(&stop))?;

	csfs_fs::server::serve(listener, disk_addr, service, stop);
	log::info!("fs_server: shutting down");
	Ok(())
}

fn resolve_disk_addr(host: &str, port: u16) -> Result<SocketAddr> {
	(host, port)
		.to_socket_addrs()
		.context("failed to resolve disk service address")?
		.next()
		.with_context(|| format!("no addresses found for {host}:{port}"))
}

fn install_sigint_handler(stop: Arc<AtomicBool>) -> Result<()> {
	ctrlc::set_handler(move || {
		log::info!("fs_server: received SIGINT, stopping accept loop");
		stop.store(true, Ordering::SeqCst);
	})
	.context("failed to install SIGINT handler")
}
