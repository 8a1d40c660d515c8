use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
	time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

pub mod reporter;

pub use reporter::Reporter;

#[derive(Debug, Default)]
struct MessageCounters {
	sent: AtomicU64,
	received: AtomicU64,
	success: AtomicU64,
	failed: AtomicU64,
	timeouts: AtomicU64,
	retransmits: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
	pub sent: u64,
	pub received: u64,
	pub success: u64,
	pub failed: u64,
	pub timeouts: u64,
	pub retransmits: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
	pub established: u64,
	pub modified: u64,
	pub deleted: u64,
	pub failed: u64,
	pub active: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResponseTimeStats {
	pub min_ms: f64,
	pub avg_ms: f64,
	pub max_ms: f64,
	pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
	pub start_time: DateTime<Utc>,
	pub end_time: Option<DateTime<Utc>>,
	pub duration_sec: f64,
	pub messages: BTreeMap<String, MessageStats>,
	pub sessions: SessionStats,
	/// Absent until one transaction succeeded
	pub response_times_ms: Option<ResponseTimeStats>,
	pub throughput_msg_per_sec: f64,
}

impl StatsSnapshot {
	pub fn total_sent(&self) -> u64 {
		self.messages.values().map(|m| m.sent).sum()
	}

	pub fn total_received(&self) -> u64 {
		self.messages.values().map(|m| m.received).sum()
	}
}

/// Run wide counters, keyed by request type name. Shared by the session
/// manager and the transaction tracker.
#[derive(Debug)]
pub struct Collector {
	started: Instant,
	started_at: DateTime<Utc>,
	finished: Mutex<Option<(Instant, DateTime<Utc>)>>,
	messages: DashMap<String, MessageCounters>,
	sessions_established: AtomicU64,
	sessions_modified: AtomicU64,
	sessions_deleted: AtomicU64,
	sessions_failed: AtomicU64,
	response_times: Mutex<Vec<Duration>>,
}

impl Default for Collector {
	fn default() -> Self {
		Collector::new()
	}
}

impl Collector {
	pub fn new() -> Collector {
		Collector {
			started: Instant::now(),
			started_at: Utc::now(),
			finished: Mutex::new(None),
			messages: DashMap::new(),
			sessions_established: AtomicU64::new(0),
			sessions_modified: AtomicU64::new(0),
			sessions_deleted: AtomicU64::new(0),
			sessions_failed: AtomicU64::new(0),
			response_times: Mutex::new(Vec::new()),
		}
	}

	fn bump(&self, msg_type: &str, field: impl Fn(&MessageCounters) -> &AtomicU64) {
		if let Some(counters) = self.messages.get(msg_type) {
			field(counters.value()).fetch_add(1, Ordering::Relaxed);
			return;
		}
		let counters = self.messages.entry(msg_type.to_string()).or_default();
		field(counters.value()).fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_sent(&self, msg_type: &str) {
		self.bump(msg_type, |c| &c.sent);
	}

	pub fn record_received(&self, msg_type: &str) {
		self.bump(msg_type, |c| &c.received);
	}

	pub fn record_success(&self, msg_type: &str, response_time: Duration) {
		self.bump(msg_type, |c| &c.success);
		self.response_times
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(response_time);
	}

	/// Rejected by the peer, or otherwise failed after a response
	pub fn record_failure(&self, msg_type: &str) {
		self.bump(msg_type, |c| &c.failed);
	}

	pub fn record_timeout(&self, msg_type: &str) {
		self.bump(msg_type, |c| &c.timeouts);
	}

	pub fn record_retransmit(&self, msg_type: &str) {
		self.bump(msg_type, |c| &c.retransmits);
	}

	pub fn session_established(&self) {
		self.sessions_established.fetch_add(1, Ordering::Relaxed);
	}

	pub fn session_modified(&self) {
		self.sessions_modified.fetch_add(1, Ordering::Relaxed);
	}

	pub fn session_deleted(&self) {
		self.sessions_deleted.fetch_add(1, Ordering::Relaxed);
	}

	pub fn session_failed(&self) {
		self.sessions_failed.fetch_add(1, Ordering::Relaxed);
	}

	/// Freeze the elapsed time. Later calls keep the first end time.
	pub fn finish(&self) {
		let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
		if finished.is_none() {
			*finished = Some((Instant::now(), Utc::now()));
		}
	}

	pub fn elapsed(&self) -> Duration {
		match *self.finished.lock().unwrap_or_else(|e| e.into_inner()) {
			Some((end, _)) => end.duration_since(self.started),
			None => self.started.elapsed(),
		}
	}

	pub fn response_time_stats(&self) -> Option<ResponseTimeStats> {
		let mut sorted = self.response_times.lock().unwrap_or_else(|e| e.into_inner()).clone();
		if sorted.is_empty() {
			return None;
		}
		sorted.sort_unstable();
		let n = sorted.len();
		let total: Duration = sorted.iter().sum();
		let p99_idx = ((n as f64 * 0.99).ceil() as usize).clamp(1, n) - 1;
		Some(ResponseTimeStats {
			min_ms: as_ms(sorted[0]),
			avg_ms: as_ms(total / n as u32),
			max_ms: as_ms(sorted[n - 1]),
			p99_ms: as_ms(sorted[p99_idx]),
		})
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		let messages = self
			.messages
			.iter()
			.map(|entry| {
				let c = entry.value();
				(
					entry.key().clone(),
					MessageStats {
						sent: c.sent.load(Ordering::Relaxed),
						received: c.received.load(Ordering::Relaxed),
						success: c.success.load(Ordering::Relaxed),
						failed: c.failed.load(Ordering::Relaxed),
						timeouts: c.timeouts.load(Ordering::Relaxed),
						retransmits: c.retransmits.load(Ordering::Relaxed),
					},
				)
			})
			.collect::<BTreeMap<_, _>>();
		let established = self.sessions_established.load(Ordering::Relaxed);
		let deleted = self.sessions_deleted.load(Ordering::Relaxed);
		let elapsed = self.elapsed();
		let end_time = self.finished.lock().unwrap_or_else(|e| e.into_inner()).map(|(_, at)| at);
		let mut snapshot = StatsSnapshot {
			start_time: self.started_at,
			end_time,
			duration_sec: elapsed.as_secs_f64(),
			messages,
			sessions: SessionStats {
				established,
				modified: self.sessions_modified.load(Ordering::Relaxed),
				deleted,
				failed: self.sessions_failed.load(Ordering::Relaxed),
				active: established.saturating_sub(deleted),
			},
			response_times_ms: self.response_time_stats(),
			throughput_msg_per_sec: 0.0,
		};
		if snapshot.duration_sec > 0.0 {
			snapshot.throughput_msg_per_sec = snapshot.total_sent() as f64 / snapshot.duration_sec;
		}
		snapshot
	}
}

fn as_ms(d: Duration) -> f64 {
	d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::Arc;

	#[test]
	fn test_counters_by_type() {
		let c = Collector::new();
		c.record_sent("SessionEstablishmentRequest");
		c.record_sent("SessionEstablishmentRequest");
		c.record_received("SessionEstablishmentRequest");
		c.record_failure("SessionEstablishmentRequest");
		c.record_retransmit("HeartbeatRequest");
		c.record_timeout("HeartbeatRequest");
		let snap = c.snapshot();
		assert_eq!(
			snap.messages["SessionEstablishmentRequest"],
			MessageStats {
				sent: 2,
				received: 1,
				failed: 1,
				..Default::default()
			}
		);
		assert_eq!(snap.messages["HeartbeatRequest"].timeouts, 1);
		assert_eq!(snap.total_sent(), 2);
		assert_eq!(snap.total_received(), 1);
		assert!(snap.response_times_ms.is_none());
	}

	#[test]
	fn test_active_sessions_floor_at_zero() {
		let c = Collector::new();
		c.session_deleted();
		c.session_established();
		c.session_established();
		c.session_failed();
		let s = c.snapshot().sessions;
		assert_eq!(s.established, 2);
		assert_eq!(s.active, 1);
		assert_eq!(s.failed, 1);
	}

	#[test]
	fn test_response_time_percentiles() {
		let c = Collector::new();
		for ms in 1..=100u64 {
			c.record_success("HeartbeatRequest", Duration::from_millis(ms));
		}
		let rt = c.response_time_stats().unwrap();
		assert_eq!(rt.min_ms, 1.0);
		assert_eq!(rt.max_ms, 100.0);
		assert_eq!(rt.p99_ms, 99.0);
		assert!((rt.avg_ms - 50.5).abs() < 1e-9);

		let single = Collector::new();
		single.record_success("HeartbeatRequest", Duration::from_millis(7));
		assert_eq!(single.response_time_stats().unwrap().p99_ms, 7.0);
	}

	#[test]
	fn test_finish_freezes_elapsed() {
		let c = Collector::new();
		c.finish();
		let first = c.elapsed();
		std::thread::sleep(Duration::from_millis(5));
		c.finish();
		assert_eq!(c.elapsed(), first);
		assert!(c.snapshot().end_time.is_some());
	}

	#[test]
	fn test_concurrent_recording() {
		let c = Arc::new(Collector::new());
		let handles = (0..4)
			.map(|_| {
				let c = c.clone();
				std::thread::spawn(move || {
					for _ in 0..250 {
						c.record_sent("SessionModificationRequest");
					}
				})
			})
			.collect::<Vec<_>>();
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(c.snapshot().messages["SessionModificationRequest"].sent, 1000);
	}
}
