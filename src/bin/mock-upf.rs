use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use clap::{App, Arg};
use log::{error, info};
use signal_hook::{
	consts::{SIGINT, SIGTERM},
	iterator::Signals,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use pfcp_replay::mockupf::MockUpf;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
		.format_timestamp_millis()
		.init();

	let matches = App::new("mock-upf")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Answers PFCP requests like a UPF, for exercising pfcp-replay")
		.arg(Arg::new("listen").long("listen").takes_value(true).default_value("127.0.0.1:8805"))
		.arg(Arg::new("ip").long("ip").takes_value(true).help("Address announced in Node ID and UP F-SEID"))
		.arg(Arg::new("reject-establishment").long("reject-establishment"))
		.arg(Arg::new("drop-first").long("drop-first").takes_value(true).default_value("0"))
		.get_matches();

	let listen: SocketAddr = match matches.value_of("listen").unwrap_or("127.0.0.1:8805").parse() {
		Ok(a) => a,
		Err(e) => {
			eprintln!("Error: --listen: {}", e);
			std::process::exit(2);
		}
	};
	let node_ip = match matches.value_of("ip").map(|v| v.parse::<IpAddr>()).transpose() {
		Ok(ip) => ip.unwrap_or_else(|| listen.ip()),
		Err(e) => {
			eprintln!("Error: --ip: {}", e);
			std::process::exit(2);
		}
	};
	let drop_first: u32 = match matches.value_of("drop-first").unwrap_or("0").parse() {
		Ok(n) => n,
		Err(e) => {
			eprintln!("Error: --drop-first: {}", e);
			std::process::exit(2);
		}
	};

	let upf = MockUpf::new(node_ip);
	upf.set_reject_establishment(matches.is_present("reject-establishment"));
	upf.drop_first(drop_first);

	let socket = match UdpSocket::bind(listen).await {
		Ok(s) => Arc::new(s),
		Err(e) => {
			error!("Failed to bind {}: {}", listen, e);
			std::process::exit(1);
		}
	};

	let shutdown = CancellationToken::new();
	let signal_token = shutdown.clone();
	match Signals::new(&[SIGINT, SIGTERM]) {
		Ok(mut signals) => {
			std::thread::spawn(move || {
				if let Some(sig) = signals.forever().next() {
					info!("Received signal {}, exiting", sig);
					signal_token.cancel();
				}
			});
		}
		Err(e) => error!("Cannot install signal handlers: {}", e),
	}

	upf.clone().serve(socket, shutdown).await;
	info!("Mock UPF stopped with {} sessions open", upf.session_count());
}
