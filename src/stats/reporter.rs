use std::{fmt::Write as _, fs, path::PathBuf, sync::Arc, time::Duration};

use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Collector, StatsSnapshot};
use crate::error::Result;

pub struct Reporter {
	collector: Arc<Collector>,
	interval: Duration,
	export_file: Option<PathBuf>,
}

impl Reporter {
	/// An empty `export_file` disables the JSON export
	pub fn new(collector: Arc<Collector>, report_interval_sec: u64, export_file: &str) -> Reporter {
		Reporter {
			collector,
			interval: Duration::from_secs(report_interval_sec),
			export_file: if export_file.is_empty() {
				None
			} else {
				Some(PathBuf::from(export_file))
			},
		}
	}

	/// Log a progress line every interval until `token` fires. No task for a zero interval.
	pub fn start_periodic(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
		if self.interval.is_zero() {
			return None;
		}
		let collector = self.collector.clone();
		let period = self.interval;
		Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			loop {
				tokio::select! {
					_ = token.cancelled() => return,
					_ = ticker.tick() => info!("{}", progress_line(&collector.snapshot())),
				}
			}
		}))
	}

	pub fn format_report(&self) -> String {
		format_report(&self.collector.snapshot())
	}

	pub fn final_report(&self) {
		self.collector.finish();
		println!("{}", self.format_report());
	}

	pub fn export_json(&self) -> Result<()> {
		let path = match &self.export_file {
			Some(p) => p,
			None => return Ok(()),
		};
		let snapshot = self.collector.snapshot();
		let data = serde_json::to_string_pretty(&snapshot)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
		fs::write(path, data)?;
		info!("Statistics exported to {}", path.display());
		Ok(())
	}
}

fn progress_line(snap: &StatsSnapshot) -> String {
	format!(
		"[{:.0}s] sent={} recv={} sessions: established={} active={} deleted={} failed={}",
		snap.duration_sec,
		snap.total_sent(),
		snap.total_received(),
		snap.sessions.established,
		snap.sessions.active,
		snap.sessions.deleted,
		snap.sessions.failed
	)
}

pub fn format_report(snap: &StatsSnapshot) -> String {
	let mut out = String::new();
	let _ = writeln!(out);
	let _ = writeln!(out, "=== PFCP Replay Statistics (elapsed: {:.0}s) ===", snap.duration_sec);
	let _ = writeln!(out, "Messages:");
	for (name, s) in &snap.messages {
		let _ = writeln!(
			out,
			"  {:<30} sent={:<5} recv={:<5} success={:<5} fail={:<5} timeout={:<5} retx={:<5}",
			format!("{}:", name),
			s.sent,
			s.received,
			s.success,
			s.failed,
			s.timeouts,
			s.retransmits
		);
	}
	let _ = writeln!(out, "Sessions:");
	let _ = writeln!(
		out,
		"  Established: {}  |  Modified: {}  |  Active: {}  |  Deleted: {}  |  Failed: {}",
		snap.sessions.established, snap.sessions.modified, snap.sessions.active, snap.sessions.deleted, snap.sessions.failed
	);
	if let Some(rt) = snap.response_times_ms {
		let _ = writeln!(out, "Response Times:");
		let _ = writeln!(
			out,
			"  Min: {:.3}ms  |  Avg: {:.3}ms  |  Max: {:.3}ms  |  P99: {:.3}ms",
			rt.min_ms, rt.avg_ms, rt.max_ms, rt.p99_ms
		);
	}
	if snap.duration_sec > 0.0 {
		let _ = writeln!(out, "Throughput:");
		let _ = writeln!(out, "  {:.1} msg/s", snap.throughput_msg_per_sec);
	}
	let _ = writeln!(out, "================================================");
	out
}
