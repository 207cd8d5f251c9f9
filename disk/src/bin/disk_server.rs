use std::{
	net::TcpListener,
	path::PathBuf,
	process::ExitCode,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use csfs_disk::{Arm, DiskImage, Geometry};

/// Simulated block device server: `cyl x sec` sectors of 128 bytes each,
/// backed by a memory-mapped file, with simulated seek latency between
/// cylinders.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
	/// TCP port to listen on
	port: u16,

	/// Number of cylinders
	cylinders: u32,

	/// Sectors per cylinder
	sectors: u32,

	/// Track-to-track seek time, in microseconds
	track_us: u64,

	/// Path to the backing file (created if absent)
	backing_file: PathBuf,

	#[command(flatten)]
	verbose: Verbosity<WarnLevel>,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.init();

	let geometry = match Geometry::new(cli.cylinders, cli.sectors) {
		Ok(g) => g,
		Err(e) => {
			eprintln!("disk_server: invalid geometry: {e}");
			return ExitCode::from(2);
		}
	};

	match run(&cli, geometry) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("disk_server: {e:#}");
			ExitCode::from(1)
		}
	}
}

fn run(cli: &Cli, geometry: Geometry) -> Result<()> {
	let image = DiskImage::open(&cli.backing_file, geometry).context("failed to open backing file")?;
	let arm = Arc::new(Arm::new(image, cli.track_us));

	let listener =
		TcpListener::bind(("0.0.0.0", cli.port)).context("failed to bind listen socket")?;
	log::info!(
		"disk_server: listening on port {} ({}x{} sectors, {}us/track, backing file {:?})",
		cli.port,
		cli.cylinders,
		cli.sectors,
		cli.track_us,
		cli.backing_file
	);

	let stop = Arc::new(AtomicBool::new(false));
	install_sigint_handler(Arc::clone(&stop))?;

	csfs_disk::server::serve(listener, arm, stop);
	log::info!("disk_server: shutting down");
	Ok(())
}

fn install_sigint_handler(stop: Arc<AtomicBool>) -> Result<()> {
	ctrlc::set_handler(move || {
		log::info!("disk_server: received SIGINT, stopping accept loop");
		stop.store(true, Ordering::SeqCst);
	})
	.context("failed to install SIGINT handler")
}
