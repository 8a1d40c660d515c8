use std::{
	fmt::Display,
	fs::{File, OpenOptions},
	io::{self, Write},
	path::Path,
	str::FromStr,
	sync::Arc,
	time::Duration,
};

use clap::{App, Arg, ArgMatches};
use log::{error, info, warn};
use signal_hook::{
	consts::{SIGINT, SIGTERM},
	iterator::Signals,
};
use tokio_util::sync::CancellationToken;

use pfcp_replay::{
	config::{CliOverrides, Config, LoggingConfig},
	n4::{run_receiver, TransactionTracker, UdpTransport},
	pcap,
	session::{IpPool, SeidAllocator, SessionManager},
	stats::{Collector, Reporter},
	ReplayError, Result,
};

/// Upper bound for deleting leftover sessions after the replay
const CLEANUP_DEADLINE: Duration = Duration::from_secs(30);

fn cli() -> App<'static> {
	App::new("pfcp-replay")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Replays a recorded PFCP session trace against a UPF")
		.arg(Arg::new("config").long("config").takes_value(true).help("YAML config file"))
		.arg(Arg::new("pcap").long("pcap").takes_value(true).help("Capture file to replay"))
		.arg(Arg::new("smf-ip").long("smf-ip").takes_value(true).help("Local SMF address"))
		.arg(Arg::new("upf-ip").long("upf-ip").takes_value(true).help("Target UPF address"))
		.arg(Arg::new("upf-port").long("upf-port").takes_value(true).help("Target UPF PFCP port"))
		.arg(Arg::new("ue-pool").long("ue-pool").takes_value(true).help("UE IPv4 pool, CIDR"))
		.arg(Arg::new("seid-start").long("seid-start").takes_value(true))
		.arg(
			Arg::new("seid-strategy")
				.long("seid-strategy")
				.takes_value(true)
				.possible_values(["sequential", "random"]),
		)
		.arg(
			Arg::new("message-interval")
				.long("message-interval")
				.takes_value(true)
				.help("Delay between messages in milliseconds"),
		)
		.arg(Arg::new("timeout").long("timeout").takes_value(true).help("Response timeout in milliseconds"))
		.arg(Arg::new("max-retries").long("max-retries").takes_value(true))
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.takes_value(true)
				.possible_values(["debug", "info", "warn", "error"]),
		)
		.arg(Arg::new("dry-run").long("dry-run").help("Rewrite the recording without sending anything"))
		.arg(Arg::new("stats-only").long("stats-only").help("Count the messages in the recording and exit"))
		.arg(Arg::new("cleanup").long("cleanup").help("Delete sessions left established after the replay"))
		.arg(Arg::new("no-association").long("no-association").help("Skip Association Setup requests"))
		.arg(
			Arg::new("strip-ipv6")
				.long("strip-ipv6")
				.takes_value(true)
				.possible_values(["true", "false"]),
		)
}

fn parse_opt<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
	T: FromStr,
	T::Err: Display,
{
	matches
		.value_of(name)
		.map(|v| {
			v.parse::<T>()
				.map_err(|e| ReplayError::Config(format!("--{} {:?}: {}", name, v, e)))
		})
		.transpose()
}

fn overrides(matches: &ArgMatches) -> Result<CliOverrides> {
	Ok(CliOverrides {
		pcap_file: matches.value_of("pcap").map(String::from),
		smf_ip: matches.value_of("smf-ip").map(String::from),
		upf_ip: matches.value_of("upf-ip").map(String::from),
		upf_port: parse_opt(matches, "upf-port")?,
		ue_pool: matches.value_of("ue-pool").map(String::from),
		seid_start: parse_opt(matches, "seid-start")?,
		seid_strategy: matches.value_of("seid-strategy").map(String::from),
		message_interval_ms: parse_opt(matches, "message-interval")?,
		response_timeout_ms: parse_opt(matches, "timeout")?,
		max_retries: parse_opt(matches, "max-retries")?,
		log_level: matches.value_of("log-level").map(String::from),
		cleanup: matches.is_present("cleanup"),
		no_association: matches.is_present("no-association"),
		strip_ipv6: parse_opt(matches, "strip-ipv6")?,
	})
}

/// Log sink writing to the log file and, optionally, stderr
struct Tee {
	file: File,
	console: bool,
}

impl Write for Tee {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if self.console {
			let _ = io::stderr().write_all(buf);
		}
		self.file.write_all(buf)?;
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}
}

fn init_logging(cfg: &LoggingConfig) {
	let mut builder = env_logger::Builder::new();
	builder.parse_filters(&cfg.level);
	if let Ok(filters) = std::env::var("RUST_LOG") {
		builder.parse_filters(&filters);
	}
	builder.format_timestamp_millis();

	let mut open_error = None;
	if !cfg.file.is_empty() {
		match OpenOptions::new().create(true).append(true).open(&cfg.file) {
			Ok(file) => {
				builder.target(env_logger::Target::Pipe(Box::new(Tee {
					file,
					console: cfg.console,
				})));
			}
			Err(e) => open_error = Some(e),
		}
	}
	builder.init();
	if let Some(e) = open_error {
		warn!("Cannot open log file {}, logging to console only: {}", cfg.file, e);
	}
}

fn stats_only(cfg: &Config) -> Result<()> {
	if cfg.input.pcap_file.is_empty() {
		return Err(ReplayError::Config("input.pcap_file is required".to_string()));
	}
	let counts = pcap::count_messages(Path::new(&cfg.input.pcap_file))?;
	println!("PFCP messages in {}:", cfg.input.pcap_file);
	for (name, count) in &counts {
		println!("  {:<40} {}", format!("{}:", name), count);
	}
	println!("  {:<40} {}", "Total:", counts.values().sum::<usize>());
	Ok(())
}

fn dry_run(cfg: &Config) -> Result<()> {
	let parsed = pcap::parse_with_mappings(Path::new(&cfg.input.pcap_file))?;
	pcap::validate_has_establishment(&parsed.messages)?;
	let mut manager = SessionManager::offline(
		cfg.manager_options(),
		SeidAllocator::new(cfg.seid_strategy()?, cfg.session.seid_start),
		IpPool::new(&cfg.session.ue_ip_pool, cfg.session.issue_broadcast_address)?,
		Arc::new(Collector::new()),
	);
	manager.set_seid_mappings(&parsed.seid_mappings);
	let report = manager.preview(&parsed.messages);

	println!("Dry run over {} recorded requests:", report.total);
	for (name, count) in &report.rewritten {
		println!("  {:<40} {}", format!("{}:", name), count);
	}
	println!("  Would send:        {}", report.rewritten_count());
	println!("  Cannot rewrite:    {}", report.failed);
	println!("  Unsupported:       {}", report.skipped);
	println!("  Undecodable:       {}", report.undecodable);
	Ok(())
}

async fn replay(cfg: &Config) -> Result<()> {
	let parsed = pcap::parse_with_mappings(Path::new(&cfg.input.pcap_file))?;
	pcap::validate_has_establishment(&parsed.messages)?;
	if !pcap::has_deletion_requests(&parsed.messages) && !cfg.session.cleanup_on_exit {
		warn!("Recording has no Session Deletion Request, replayed sessions will stay on the UPF (see --cleanup)");
	}

	let shutdown = CancellationToken::new();
	let mut signals = Signals::new(&[SIGINT, SIGTERM])?;
	let signal_handle = signals.handle();
	let signal_token = shutdown.clone();
	let sigthread = std::thread::spawn(move || {
		for sig in signals.forever() {
			if signal_token.is_cancelled() {
				std::process::exit(130);
			}
			info!("Received signal {}, stopping replay", sig);
			signal_token.cancel();
		}
	});

	let stats = Arc::new(Collector::new());
	let transport = Arc::new(UdpTransport::bind(cfg.local_addr(), cfg.upf_addr()?).await?);
	let tracker = Arc::new(TransactionTracker::new(
		transport.clone(),
		stats.clone(),
		cfg.response_timeout(),
		cfg.timing.max_retries,
	));

	// outlives the replay token so cleanup can still talk to the UPF
	let io_token = CancellationToken::new();
	let receiver = tokio::spawn(run_receiver(transport.socket(), transport.peer(), tracker.clone(), io_token.clone()));
	let sweeper = tokio::spawn(tracker.clone().run_sweeper(io_token.clone()));

	let report_interval = if cfg.stats.enabled { cfg.stats.report_interval_sec } else { 0 };
	let reporter = Reporter::new(stats.clone(), report_interval, &cfg.stats.export_file);
	let periodic = reporter.start_periodic(io_token.clone());

	let mut manager = SessionManager::new(
		cfg.manager_options(),
		SeidAllocator::new(cfg.seid_strategy()?, cfg.session.seid_start),
		IpPool::new(&cfg.session.ue_ip_pool, cfg.session.issue_broadcast_address)?,
		tracker,
		stats,
	);
	manager.set_seid_mappings(&parsed.seid_mappings);

	info!("Starting replay of {} messages", parsed.messages.len());
	let outcome = manager.replay(&parsed.messages, &shutdown).await;
	match &outcome {
		Ok(()) => info!("Replay complete"),
		Err(ReplayError::Cancelled) => warn!("Replay interrupted"),
		Err(e) => error!("Replay aborted: {}", e),
	}

	if outcome.is_ok() && cfg.session.cleanup_on_exit {
		match tokio::time::timeout(CLEANUP_DEADLINE, manager.cleanup_sessions(&CancellationToken::new())).await {
			Ok(deleted) => info!("Cleanup deleted {} sessions", deleted),
			Err(_) => warn!("Cleanup did not finish within {:?}", CLEANUP_DEADLINE),
		}
	}
	let remaining = manager.active_session_count();
	if remaining > 0 {
		info!("{} sessions remain established on the UPF", remaining);
	}

	io_token.cancel();
	let _ = receiver.await;
	let _ = sweeper.await;
	if let Some(periodic) = periodic {
		let _ = periodic.await;
	}
	if cfg.stats.enabled {
		reporter.final_report();
		if let Err(e) = reporter.export_json() {
			error!("Failed to export statistics: {}", e);
		}
	}

	signal_handle.close();
	let _ = sigthread.join();

	match outcome {
		Err(ReplayError::Cancelled) => Ok(()),
		other => other,
	}
}

async fn run() -> Result<()> {
	let matches = cli().get_matches();
	let cli_overrides = overrides(&matches)?;
	let mut cfg = Config::load(matches.value_of("config").map(Path::new))?;
	cfg.apply(&cli_overrides);
	init_logging(&cfg.logging);

	if matches.is_present("stats-only") {
		return stats_only(&cfg);
	}
	if matches.is_present("dry-run") {
		cfg.validate_for_dry_run()?;
		println!("{}", cfg.summary());
		return dry_run(&cfg);
	}
	cfg.validate()?;
	println!("{}", cfg.summary());
	replay(&cfg).await
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
	if let Err(e) = run().await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}
