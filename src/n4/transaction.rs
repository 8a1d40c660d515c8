use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use libpfcp::{models::message_type_name, PFCPMessage};
use log::{debug, error, warn};
use tokio::{sync::oneshot, time::Instant};
use tokio_util::sync::CancellationToken;

use super::transport::Transport;
use crate::{
	error::{ReplayError, Result},
	stats::Collector,
};

/// How often pending transactions are checked for expiry
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct TransactionResult {
	pub response: PFCPMessage,
	/// From the first transmission, retransmissions included
	pub response_time: Duration,
}

pub type TransactionOutcome = Result<TransactionResult>;

struct PendingTransaction {
	msg_type: u8,
	request: Vec<u8>,
	first_sent: Instant,
	sent_at: Instant,
	retry_count: u32,
	result: oneshot::Sender<TransactionOutcome>,
}

/// Matches responses to in-flight requests by sequence number and
/// retransmits the ones that stay unanswered.
pub struct TransactionTracker {
	pending: Mutex<HashMap<u32, PendingTransaction>>,
	transport: Arc<dyn Transport>,
	stats: Arc<Collector>,
	timeout: Duration,
	max_retries: u32,
}

impl TransactionTracker {
	pub fn new(transport: Arc<dyn Transport>, stats: Arc<Collector>, timeout: Duration, max_retries: u32) -> TransactionTracker {
		TransactionTracker {
			pending: Mutex::new(HashMap::new()),
			transport,
			stats,
			timeout,
			max_retries,
		}
	}

	/// Register a request about to be sent. A transaction already pending under
	/// `seq` is failed as superseded.
	pub fn track(&self, seq: u32, msg_type: u8, request: Vec<u8>) -> oneshot::Receiver<TransactionOutcome> {
		let (tx, rx) = oneshot::channel();
		let now = Instant::now();
		let previous = self.lock().insert(
			seq,
			PendingTransaction {
				msg_type,
				request,
				first_sent: now,
				sent_at: now,
				retry_count: 0,
				result: tx,
			},
		);
		if let Some(previous) = previous {
			warn!("Sequence number {} reused while still pending", seq);
			let _ = previous.result.send(Err(ReplayError::Cancelled));
		}
		rx
	}

	/// Track and transmit `request`. Nothing stays pending if the send fails.
	pub async fn send(&self, seq: u32, msg_type: u8, request: Vec<u8>) -> Result<oneshot::Receiver<TransactionOutcome>> {
		let rx = self.track(seq, msg_type, request.clone());
		if let Err(e) = self.transport.send(&request).await {
			self.forget(seq);
			return Err(e);
		}
		Ok(rx)
	}

	/// Drop a transaction whose first send failed
	pub fn forget(&self, seq: u32) {
		self.lock().remove(&seq);
	}

	/// Fulfil the transaction `response` answers. Returns false for unknown sequence numbers.
	pub fn resolve(&self, response: PFCPMessage) -> bool {
		let seq = response.seq();
		let pending = match self.lock().remove(&seq) {
			Some(p) => p,
			None => {
				warn!(
					"Response {} with seq {} matches no pending request, discarded",
					response.type_name(),
					seq
				);
				return false;
			}
		};
		self.stats.record_received(message_type_name(pending.msg_type));
		let result = TransactionResult {
			response,
			response_time: pending.first_sent.elapsed(),
		};
		if pending.result.send(Ok(result)).is_err() {
			debug!("Waiter for seq {} went away before the response arrived", seq);
		}
		true
	}

	/// Fail the transaction pending under `seq`, if it is still there
	fn fail(&self, seq: u32, err: ReplayError) {
		let pending = self.lock().remove(&seq);
		if let Some(pending) = pending {
			self.stats.record_failure(message_type_name(pending.msg_type));
			let _ = pending.result.send(Err(err));
		}
	}

	pub fn cancel_all(&self) {
		let drained = self.lock().drain().collect::<Vec<_>>();
		if !drained.is_empty() {
			debug!("Cancelling {} pending transactions", drained.len());
		}
		for (_, pending) in drained {
			let _ = pending.result.send(Err(ReplayError::Cancelled));
		}
	}

	pub fn pending_count(&self) -> usize {
		self.lock().len()
	}

	/// One pass over the pending map: retransmit or expire what timed out
	pub async fn sweep(&self) {
		let now = Instant::now();
		let mut retransmit = Vec::new();
		let mut expired = Vec::new();
		{
			let mut pending = self.lock();
			let timed_out = pending
				.iter()
				.filter(|(_, p)| now.duration_since(p.sent_at) >= self.timeout)
				.map(|(seq, _)| *seq)
				.collect::<Vec<_>>();
			for seq in timed_out {
				let exhausted = match pending.get_mut(&seq) {
					Some(p) if p.retry_count < self.max_retries => {
						p.retry_count += 1;
						p.sent_at = now;
						retransmit.push((seq, p.msg_type, p.retry_count, p.request.clone()));
						false
					}
					Some(_) => true,
					None => false,
				};
				if exhausted {
					if let Some(p) = pending.remove(&seq) {
						expired.push((seq, p));
					}
				}
			}
		}

		for (seq, p) in expired {
			let name = message_type_name(p.msg_type);
			error!("{} seq {} timed out after {} retries", name, seq, self.max_retries);
			self.stats.record_timeout(name);
			let _ = p.result.send(Err(ReplayError::Timeout {
				retries: self.max_retries,
			}));
		}
		for (seq, msg_type, attempt, request) in retransmit {
			let name = message_type_name(msg_type);
			warn!("Retransmitting {} seq {} ({}/{})", name, seq, attempt, self.max_retries);
			self.stats.record_retransmit(name);
			if let Err(e) = self.transport.send(&request).await {
				error!("Retransmission of {} seq {} failed: {}", name, seq, e);
				self.fail(seq, e);
			}
		}
	}

	/// Sweep every [`SWEEP_INTERVAL`] until `token` fires, then fail whatever is left
	pub async fn run_sweeper(self: Arc<Self>, token: CancellationToken) {
		let mut interval = tokio::time::interval(SWEEP_INTERVAL);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		loop {
			tokio::select! {
				_ = token.cancelled() => break,
				_ = interval.tick() => self.sweep().await,
			}
		}
		self.cancel_all();
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, PendingTransaction>> {
		self.pending.lock().unwrap_or_else(|e| e.into_inner())
	}
}
