use std::{
	collections::{BTreeMap, HashMap},
	net::IpAddr,
	sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
	time::Duration,
};

use libpfcp::{models::Cause, MsgType, PFCPError, PFCPMessage};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{IpPool, SeidAllocator, SeidMapping, SessionInfo, SessionState};
use crate::{
	error::{ReplayError, Result},
	n4::{modifier::original_local_seid, MessageModifier, TransactionResult, TransactionTracker},
	pcap::RawPFCPMessage,
	sequence::SequenceCounter,
	stats::Collector,
};

#[derive(Debug, Clone)]
pub struct ManagerOptions {
	/// Written into the CP F-SEID of establishment requests
	pub smf_ip: Option<IpAddr>,
	/// Written into Node ID IEs, `smf_ip` when unset
	pub node_id: Option<IpAddr>,
	pub strip_ipv6: bool,
	pub association_enabled: bool,
	/// Pause between two consecutive messages
	pub message_interval: Duration,
	/// Resolve recorded session SEIDs through the pre-scanned mappings only
	pub strict_session_lookup: bool,
}

impl Default for ManagerOptions {
	fn default() -> Self {
		ManagerOptions {
			smf_ip: None,
			node_id: None,
			strip_ipv6: true,
			association_enabled: true,
			message_interval: Duration::ZERO,
			strict_session_lookup: false,
		}
	}
}

/// Live sessions plus the two indexes recorded SEIDs are resolved through
#[derive(Debug, Default)]
struct SessionTables {
	by_local: HashMap<u64, SessionInfo>,
	by_original_local: HashMap<u64, u64>,
	by_original_remote: HashMap<u64, u64>,
}

impl SessionTables {
	fn remove(&mut self, local_seid: u64) -> Option<SessionInfo> {
		let session = self.by_local.remove(&local_seid)?;
		if self.by_original_local.get(&session.original_local_seid) == Some(&local_seid) {
			self.by_original_local.remove(&session.original_local_seid);
		}
		if self.by_original_remote.get(&session.original_remote_seid) == Some(&local_seid) {
			self.by_original_remote.remove(&session.original_remote_seid);
		}
		Some(session)
	}
}

/// Outcome of an offline pass over a recording
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreviewReport {
	pub total: usize,
	/// Messages that would be sent, by type
	pub rewritten: BTreeMap<String, usize>,
	pub skipped: usize,
	pub failed: usize,
	pub undecodable: usize,
}

impl PreviewReport {
	pub fn rewritten_count(&self) -> usize {
		self.rewritten.values().sum()
	}
}

/// Drives a recording against the live peer, one message at a time, and keeps
/// the recorded, local and peer-assigned SEIDs of every session joined up.
pub struct SessionManager {
	options: ManagerOptions,
	modifier: MessageModifier,
	seid_alloc: SeidAllocator,
	ip_pool: IpPool,
	seq: SequenceCounter,
	tracker: Option<Arc<TransactionTracker>>,
	stats: Arc<Collector>,
	tables: RwLock<SessionTables>,
	/// Recorded CP SEID to recorded UP SEID
	seid_mappings: HashMap<u64, u64>,
}

impl SessionManager {
	pub fn new(
		options: ManagerOptions,
		seid_alloc: SeidAllocator,
		ip_pool: IpPool,
		tracker: Arc<TransactionTracker>,
		stats: Arc<Collector>,
	) -> SessionManager {
		let mut manager = SessionManager::offline(options, seid_alloc, ip_pool, stats);
		manager.tracker = Some(tracker);
		manager
	}

	/// No N4 channel: only [`SessionManager::preview`] is usable
	pub fn offline(options: ManagerOptions, seid_alloc: SeidAllocator, ip_pool: IpPool, stats: Arc<Collector>) -> SessionManager {
		SessionManager {
			modifier: MessageModifier::new(options.smf_ip, options.node_id, options.strip_ipv6),
			options,
			seid_alloc,
			ip_pool,
			seq: SequenceCounter::new(),
			tracker: None,
			stats,
			tables: RwLock::new(SessionTables::default()),
			seid_mappings: HashMap::new(),
		}
	}

	pub fn set_seid_mappings(&mut self, mappings: &[SeidMapping]) {
		for mapping in mappings {
			debug!(
				"Registered recorded SEID mapping cp={:#x} up={:#x}",
				mapping.original_local_seid, mapping.original_remote_seid
			);
			self.seid_mappings
				.insert(mapping.original_local_seid, mapping.original_remote_seid);
		}
	}

	pub fn seid_allocator(&self) -> &SeidAllocator {
		&self.seid_alloc
	}

	pub fn ip_pool(&self) -> &IpPool {
		&self.ip_pool
	}

	pub fn sessions(&self) -> Vec<SessionInfo> {
		let mut sessions = self.read_tables().by_local.values().cloned().collect::<Vec<_>>();
		sessions.sort_by_key(|s| s.local_seid);
		sessions
	}

	pub fn session_by_original_local_seid(&self, seid: u64) -> Option<SessionInfo> {
		let tables = self.read_tables();
		let local = tables.by_original_local.get(&seid)?;
		tables.by_local.get(local).cloned()
	}

	pub fn active_session_count(&self) -> usize {
		self.read_tables()
			.by_local
			.values()
			.filter(|s| s.state == SessionState::Established)
			.count()
	}

	/// Process `messages` in order. Per-message failures are logged and skipped;
	/// a fatal error or cancellation ends the run.
	pub async fn replay(&self, messages: &[RawPFCPMessage], token: &CancellationToken) -> Result<()> {
		let interval = self.options.message_interval;
		for (i, raw) in messages.iter().enumerate() {
			if token.is_cancelled() {
				info!("Replay cancelled");
				return Err(ReplayError::Cancelled);
			}
			match PFCPMessage::decode(&raw.data) {
				Ok(msg) => {
					if let Err(e) = self.process_message(&msg, token).await {
						if e.is_fatal() {
							error!("Stopping replay at message {} ({}): {}", i, msg.type_name(), e);
							return Err(e);
						}
						error!("Failed to process message {} ({}): {}", i, msg.type_name(), e);
					}
				}
				Err(e) => warn!("Failed to decode PFCP message {}, skipping: {}", i, e),
			}
			if !interval.is_zero() && i + 1 < messages.len() {
				tokio::select! {
					_ = token.cancelled() => {
						info!("Replay cancelled");
						return Err(ReplayError::Cancelled);
					}
					_ = tokio::time::sleep(interval) => {}
				}
			}
		}
		Ok(())
	}

	pub async fn process_message(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		match MsgType::from_u8(msg.msg_type()) {
			Some(MsgType::HeartbeatRequest) => self.handle_heartbeat(msg, token).await,
			Some(MsgType::AssociationSetupRequest) => self.handle_association_setup(msg, token).await,
			Some(MsgType::SessionEstablishmentRequest) => self.handle_session_establishment(msg, token).await,
			Some(MsgType::SessionModificationRequest) => self.handle_session_modification(msg, token).await,
			Some(MsgType::SessionDeletionRequest) => self.handle_session_deletion(msg, token).await,
			_ => {
				info!("Skipping unsupported message type {}", msg.type_name());
				Ok(())
			}
		}
	}

	async fn handle_heartbeat(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		let request = self.modifier.modify_heartbeat(msg, self.seq.next());
		debug!("Sending HeartbeatRequest seq={}", request.seq());
		let result = self.transact(&request, token).await?;
		self.stats.record_success(request.type_name(), result.response_time);
		Ok(())
	}

	async fn handle_association_setup(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		if !self.options.association_enabled {
			info!("Association Setup disabled by configuration, skipping");
			return Ok(());
		}
		let request = self.modifier.modify_association_setup(msg, self.seq.next());
		info!("Sending AssociationSetupRequest seq={}", request.seq());
		let result = match self.transact(&request, token).await {
			Ok(r) => r,
			Err(ReplayError::Cancelled) => return Err(ReplayError::Cancelled),
			Err(e) => return Err(ReplayError::AssociationFailed(e.to_string())),
		};
		self.stats.record_success(request.type_name(), result.response_time);
		info!("Association Setup successful, response_time={:?}", result.response_time);
		Ok(())
	}

	async fn handle_session_establishment(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		let (request, session) = self.prepare_establishment(msg).map_err(|e| {
			self.stats.session_failed();
			e
		})?;
		info!(
			"Sending SessionEstablishmentRequest seq={} local_seid={:#x} ue_ip={} orig_seid={:#x}",
			request.seq(),
			session.local_seid,
			session.ue_ip,
			session.original_local_seid
		);
		let result = match self.transact(&request, token).await {
			Ok(r) => r,
			Err(e) => {
				self.fail_session(session.local_seid);
				return Err(e);
			}
		};
		let remote_seid = match result.response.f_seid() {
			Ok(Some(f_seid)) => f_seid.seid,
			Ok(None) => {
				self.stats.record_failure(request.type_name());
				self.fail_session(session.local_seid);
				return Err(ReplayError::FieldAbsent {
					field: "UP F-SEID",
					message: "SessionEstablishmentResponse",
				});
			}
			Err(e) => {
				self.stats.record_failure(request.type_name());
				self.fail_session(session.local_seid);
				return Err(e.into());
			}
		};
		self.mark_established(session.local_seid, remote_seid);
		self.stats.record_success(request.type_name(), result.response_time);
		self.stats.session_established();
		info!(
			"Session established local_seid={:#x} remote_seid={:#x} ue_ip={} response_time={:?}",
			session.local_seid, remote_seid, session.ue_ip, result.response_time
		);
		Ok(())
	}

	async fn handle_session_modification(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		let (request, session) = self.prepare_modification(msg)?;
		self.set_state(session.local_seid, SessionState::Modifying);
		info!(
			"Sending SessionModificationRequest seq={} remote_seid={:#x} local_seid={:#x}",
			request.seq(),
			session.remote_seid,
			session.local_seid
		);
		let outcome = self.transact(&request, token).await;
		self.set_state(session.local_seid, SessionState::Established);
		let result = outcome?;
		self.stats.record_success(request.type_name(), result.response_time);
		self.stats.session_modified();
		info!(
			"Session modified local_seid={:#x} response_time={:?}",
			session.local_seid, result.response_time
		);
		Ok(())
	}

	async fn handle_session_deletion(&self, msg: &PFCPMessage, token: &CancellationToken) -> Result<()> {
		let (request, session) = self.prepare_deletion(msg)?;
		self.set_state(session.local_seid, SessionState::Deleting);
		info!(
			"Sending SessionDeletionRequest seq={} remote_seid={:#x} local_seid={:#x}",
			request.seq(),
			session.remote_seid,
			session.local_seid
		);
		let result = match self.transact(&request, token).await {
			Ok(r) => r,
			Err(e) => {
				// still alive on the peer as far as we know
				self.set_state(session.local_seid, SessionState::Established);
				return Err(e);
			}
		};
		self.release_session(session.local_seid, SessionState::Deleted);
		self.stats.record_success(request.type_name(), result.response_time);
		self.stats.session_deleted();
		info!(
			"Session deleted local_seid={:#x} response_time={:?}",
			session.local_seid, result.response_time
		);
		Ok(())
	}

	/// Send `request` and wait for an accepted response of the matching type
	async fn transact(&self, request: &PFCPMessage, token: &CancellationToken) -> Result<TransactionResult> {
		let tracker = self
			.tracker
			.as_ref()
			.ok_or_else(|| ReplayError::Transport("no N4 channel in offline mode".to_string()))?;
		let name = request.type_name();
		let data = request.encode().map_err(|e| ReplayError::MalformedRewrite {
			field: "message",
			reason: e.to_string(),
		})?;
		self.stats.record_sent(name);
		let rx = tracker.send(request.seq(), request.msg_type(), data).await?;
		let result = tokio::select! {
			_ = token.cancelled() => {
				tracker.forget(request.seq());
				return Err(ReplayError::Cancelled);
			}
			r = rx => r.unwrap_or(Err(ReplayError::Cancelled))?,
		};

		let response = &result.response;
		if response.msg_type() != request.msg_type() + 1 {
			self.stats.record_failure(name);
			return Err(ReplayError::Decode(PFCPError::new(&format!(
				"expected a response to {}, got {}",
				name,
				response.type_name()
			))));
		}
		match response.cause_value() {
			Some(cause) if !Cause::from_u8(cause).map_or(false, |c| c.is_accepted()) => {
				self.stats.record_failure(name);
				Err(ReplayError::Rejected { message: name, cause })
			}
			_ => Ok(result),
		}
	}

	/// Delete every session still established on the peer, returns how many went away
	pub async fn cleanup_sessions(&self, token: &CancellationToken) -> usize {
		let established = self
			.sessions()
			.into_iter()
			.filter(|s| s.state == SessionState::Established)
			.collect::<Vec<_>>();
		if established.is_empty() {
			return 0;
		}
		info!("Cleaning up {} active sessions", established.len());
		let mut deleted = 0;
		for session in established {
			if token.is_cancelled() {
				break;
			}
			let request = PFCPMessage::session_deletion_request(self.seq.next(), session.remote_seid);
			self.set_state(session.local_seid, SessionState::Deleting);
			match self.transact(&request, token).await {
				Ok(result) => {
					self.release_session(session.local_seid, SessionState::Deleted);
					self.stats.record_success(request.type_name(), result.response_time);
					self.stats.session_deleted();
					deleted += 1;
				}
				Err(e) => {
					self.set_state(session.local_seid, SessionState::Established);
					warn!("Cleanup deletion failed for local_seid {:#x}: {}", session.local_seid, e);
				}
			}
		}
		deleted
	}

	/// Rewrite the whole recording without sending anything
	pub fn preview(&self, messages: &[RawPFCPMessage]) -> PreviewReport {
		let mut report = PreviewReport {
			total: messages.len(),
			..Default::default()
		};
		for (i, raw) in messages.iter().enumerate() {
			let msg = match PFCPMessage::decode(&raw.data) {
				Ok(m) => m,
				Err(e) => {
					warn!("Failed to decode PFCP message {}: {}", i, e);
					report.undecodable += 1;
					continue;
				}
			};
			let rewritten = self.preview_message(&msg).and_then(|r| match r {
				Some(request) => request
					.encode()
					.map(|bytes| Some((request, bytes.len())))
					.map_err(|e| ReplayError::MalformedRewrite {
						field: "message",
						reason: e.to_string(),
					}),
				None => Ok(None),
			});
			match rewritten {
				Ok(Some((request, len))) => {
					debug!(
						"Message {}: {} seq={} seid={:?} ({} octets)",
						i,
						request.type_name(),
						request.seq(),
						request.seid(),
						len
					);
					*report.rewritten.entry(request.type_name().to_string()).or_insert(0) += 1;
				}
				Ok(None) => report.skipped += 1,
				Err(e) => {
					warn!("Message {} ({}) cannot be replayed: {}", i, msg.type_name(), e);
					report.failed += 1;
				}
			}
		}
		report
	}

	fn preview_message(&self, msg: &PFCPMessage) -> Result<Option<PFCPMessage>> {
		match MsgType::from_u8(msg.msg_type()) {
			Some(MsgType::HeartbeatRequest) => Ok(Some(self.modifier.modify_heartbeat(msg, self.seq.next()))),
			Some(MsgType::AssociationSetupRequest) if self.options.association_enabled => {
				Ok(Some(self.modifier.modify_association_setup(msg, self.seq.next())))
			}
			Some(MsgType::SessionEstablishmentRequest) => {
				let (request, session) = self.prepare_establishment(msg)?;
				// no live peer, the recorded UP SEID stands in
				let remote_seid = if session.original_remote_seid != 0 {
					session.original_remote_seid
				} else {
					session.local_seid
				};
				self.mark_established(session.local_seid, remote_seid);
				Ok(Some(request))
			}
			Some(MsgType::SessionModificationRequest) => Ok(Some(self.prepare_modification(msg)?.0)),
			Some(MsgType::SessionDeletionRequest) => {
				let (request, session) = self.prepare_deletion(msg)?;
				self.release_session(session.local_seid, SessionState::Deleted);
				Ok(Some(request))
			}
			_ => Ok(None),
		}
	}

	/// Allocate identifiers, rewrite the request and register the session as establishing
	fn prepare_establishment(&self, msg: &PFCPMessage) -> Result<(PFCPMessage, SessionInfo)> {
		let original_local_seid = original_local_seid(msg)?;
		let local_seid = self.seid_alloc.allocate()?;
		let ue_ip = match self.ip_pool.allocate() {
			Ok(ip) => ip,
			Err(e) => {
				self.seid_alloc.release(local_seid);
				return Err(e);
			}
		};
		let request = match self
			.modifier
			.modify_session_establishment(msg, local_seid, ue_ip, self.seq.next())
		{
			Ok(r) => r,
			Err(e) => {
				self.seid_alloc.release(local_seid);
				self.ip_pool.release(ue_ip);
				return Err(e);
			}
		};

		let mut session = SessionInfo::new(original_local_seid, local_seid, ue_ip);
		let mut tables = self.write_tables();
		if let Some(remote) = self.seid_mappings.get(&original_local_seid) {
			session.original_remote_seid = *remote;
			tables.by_original_remote.insert(*remote, local_seid);
		}
		tables.by_original_local.insert(original_local_seid, local_seid);
		tables.by_local.insert(local_seid, session.clone());
		Ok((request, session))
	}

	fn prepare_modification(&self, msg: &PFCPMessage) -> Result<(PFCPMessage, SessionInfo)> {
		let session = self.resolve_session(msg.seid().unwrap_or(0))?;
		let request = self.modifier.modify_session_modification(
			msg,
			session.remote_seid,
			Some(session.ue_ip),
			self.seq.next(),
		)?;
		Ok((request, session))
	}

	fn prepare_deletion(&self, msg: &PFCPMessage) -> Result<(PFCPMessage, SessionInfo)> {
		let session = self.resolve_session(msg.seid().unwrap_or(0))?;
		let request = self
			.modifier
			.modify_session_deletion(msg, session.remote_seid, self.seq.next());
		Ok((request, session))
	}

	/// A recorded header SEID is the recorded peer's UP SEID. Some captures carry
	/// the CP SEID there instead, which the permissive lookup also accepts.
	fn resolve_session(&self, recorded_seid: u64) -> Result<SessionInfo> {
		let tables = self.read_tables();
		let local = match tables.by_original_remote.get(&recorded_seid) {
			Some(local) => Some(local),
			None if !self.options.strict_session_lookup => tables.by_original_local.get(&recorded_seid),
			None => None,
		};
		local
			.and_then(|l| tables.by_local.get(l))
			.cloned()
			.ok_or(ReplayError::UnresolvedSession { seid: recorded_seid })
	}

	fn set_state(&self, local_seid: u64, state: SessionState) {
		if let Some(session) = self.write_tables().by_local.get_mut(&local_seid) {
			session.state = state;
		}
	}

	fn mark_established(&self, local_seid: u64, remote_seid: u64) {
		if let Some(session) = self.write_tables().by_local.get_mut(&local_seid) {
			session.remote_seid = remote_seid;
			session.state = SessionState::Established;
		}
	}

	/// Forget the session and hand its SEID and UE IP back. The returned
	/// record carries `terminal` as its final state.
	fn release_session(&self, local_seid: u64, terminal: SessionState) -> Option<SessionInfo> {
		let mut session = self.write_tables().remove(local_seid)?;
		self.seid_alloc.release(session.local_seid);
		self.ip_pool.release(session.ue_ip);
		session.state = terminal;
		debug!(
			"Session local_seid={:#x} {}, released ue_ip={}",
			session.local_seid, session.state, session.ue_ip
		);
		Some(session)
	}

	fn fail_session(&self, local_seid: u64) -> Option<SessionInfo> {
		self.stats.session_failed();
		self.release_session(local_seid, SessionState::Failed)
	}

	fn read_tables(&self) -> RwLockReadGuard<'_, SessionTables> {
		self.tables.read().unwrap_or_else(|e| e.into_inner())
	}

	fn write_tables(&self) -> RwLockWriteGuard<'_, SessionTables> {
		self.tables.write().unwrap_or_else(|e| e.into_inner())
	}
}
