//! A minimal UPF that answers every PFCP request the replayer sends.
//!
//! UP SEIDs are handed out sequentially from 1. Sessions are only tracked
//! far enough to answer modification and deletion with the right cause.

use std::{
	collections::HashMap,
	net::{IpAddr, SocketAddr},
	sync::{
		atomic::{AtomicBool, AtomicU32, Ordering},
		Arc, Mutex,
	},
};

use async_trait::async_trait;
use libpfcp::{
	handlers::{HandlerResult, NodeRequestHandlers, SessionRequestHandlers},
	models::{Cause, NodeID, RecoveryTimeStamp, F_SEID},
	MsgType, PFCPMessage, IE,
};
use log::{debug, info};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct UpfState {
	/// UP SEID to CP SEID
	sessions: HashMap<u64, u64>,
	next_up_seid: u64,
	attempts: HashMap<u32, u32>,
	received: Vec<PFCPMessage>,
}

struct Inner {
	node_ip: IpAddr,
	recovery: RecoveryTimeStamp,
	drop_first: AtomicU32,
	reject_establishment: AtomicBool,
	state: Mutex<UpfState>,
}

#[derive(Clone)]
pub struct MockUpf {
	inner: Arc<Inner>,
}

impl MockUpf {
	pub fn new(node_ip: IpAddr) -> MockUpf {
		MockUpf {
			inner: Arc::new(Inner {
				node_ip,
				recovery: RecoveryTimeStamp::new(chrono::Utc::now()),
				drop_first: AtomicU32::new(0),
				reject_establishment: AtomicBool::new(false),
				state: Mutex::new(UpfState {
					next_up_seid: 1,
					..Default::default()
				}),
			}),
		}
	}

	/// Stay silent on the first `n` transmissions of every sequence number
	pub fn drop_first(&self, n: u32) {
		self.inner.drop_first.store(n, Ordering::SeqCst);
	}

	pub fn set_reject_establishment(&self, reject: bool) {
		self.inner.reject_establishment.store(reject, Ordering::SeqCst);
	}

	/// Every request seen so far, retransmissions and dropped ones included
	pub fn received(&self) -> Vec<PFCPMessage> {
		self.lock().received.clone()
	}

	pub fn session_count(&self) -> usize {
		self.lock().sessions.len()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, UpfState> {
		self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Response header SEID and IEs for `request`, `None` to stay silent
	pub fn answer(&self, request: &PFCPMessage) -> HandlerResult {
		let mut state = self.lock();
		state.received.push(request.clone());
		let seen = state.attempts.entry(request.seq()).or_insert(0);
		*seen += 1;
		if *seen <= self.inner.drop_first.load(Ordering::SeqCst) {
			debug!("Dropping {} seq {} (attempt {})", request.type_name(), request.seq(), seen);
			return None;
		}

		let node_id = IE::from_model(&NodeID::from_ip(self.inner.node_ip));
		let recovery = IE::from_model(&self.inner.recovery);
		match MsgType::from_u8(request.msg_type())? {
			MsgType::HeartbeatRequest => Some((None, vec![recovery])),
			MsgType::AssociationSetupRequest => {
				Some((None, vec![node_id, IE::from_model(&Cause::RequestAccepted), recovery]))
			}
			MsgType::SessionEstablishmentRequest => {
				let cp_seid = match request.f_seid() {
					Ok(Some(f_seid)) => f_seid.seid,
					_ => return Some((Some(0), vec![node_id, IE::from_model(&Cause::MandatoryIEMissing)])),
				};
				if self.inner.reject_establishment.load(Ordering::SeqCst) {
					return Some((
						Some(cp_seid),
						vec![node_id, IE::from_model(&Cause::RequestRejectedUnspecified)],
					));
				}
				let up_seid = state.next_up_seid;
				state.next_up_seid += 1;
				state.sessions.insert(up_seid, cp_seid);
				let f_seid = F_SEID::new(self.inner.node_ip, up_seid);
				Some((
					Some(cp_seid),
					vec![node_id, IE::from_model(&Cause::RequestAccepted), IE::from_model(&f_seid)],
				))
			}
			MsgType::SessionModificationRequest => {
				let up_seid = request.seid().unwrap_or(0);
				match state.sessions.get(&up_seid) {
					Some(cp_seid) => Some((Some(*cp_seid), vec![IE::from_model(&Cause::RequestAccepted)])),
					None => Some((Some(0), vec![IE::from_model(&Cause::SessionContextNotFound)])),
				}
			}
			MsgType::SessionDeletionRequest => {
				let up_seid = request.seid().unwrap_or(0);
				match state.sessions.remove(&up_seid) {
					Some(cp_seid) => Some((Some(cp_seid), vec![IE::from_model(&Cause::RequestAccepted)])),
					None => Some((Some(0), vec![IE::from_model(&Cause::SessionContextNotFound)])),
				}
			}
			_ => None,
		}
	}

	/// [`MockUpf::answer`] wrapped into a full response message
	pub fn respond(&self, request: &PFCPMessage) -> Option<PFCPMessage> {
		let (seid, ies) = self.answer(request)?;
		Some(PFCPMessage::response_to(request, seid, ies))
	}

	pub async fn serve(self, socket: Arc<UdpSocket>, shutdown: CancellationToken) {
		if let Ok(addr) = socket.local_addr() {
			info!("Mock UPF listening on {}", addr);
		}
		libpfcp::handlers::serve(self, socket, shutdown).await;
	}
}

#[async_trait]
impl NodeRequestHandlers for MockUpf {
	async fn handle_heartbeat(&self, request: &PFCPMessage, _src: SocketAddr) -> HandlerResult {
		self.answer(request)
	}

	async fn handle_association_setup(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult {
		info!("Association setup from {}", src);
		self.answer(request)
	}
}

#[async_trait]
impl SessionRequestHandlers for MockUpf {
	async fn handle_session_establishment(&self, request: &PFCPMessage, _src: SocketAddr) -> HandlerResult {
		self.answer(request)
	}

	async fn handle_session_modification(&self, request: &PFCPMessage, _src: SocketAddr) -> HandlerResult {
		self.answer(request)
	}

	async fn handle_session_deletion(&self, request: &PFCPMessage, _src: SocketAddr) -> HandlerResult {
		self.answer(request)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn establishment(seq: u32, cp_seid: u64) -> PFCPMessage {
		PFCPMessage::new(
			MsgType::SessionEstablishmentRequest,
			Some(0),
			seq,
			vec![IE::from_model(&F_SEID::new("10.0.0.1".parse().unwrap(), cp_seid))],
		)
	}

	#[test]
	fn test_session_lifecycle() {
		let upf = MockUpf::new("10.0.0.2".parse().unwrap());
		let resp = upf.respond(&establishment(1, 77)).unwrap();
		assert_eq!(resp.msg_type(), MsgType::SessionEstablishmentResponse as u8);
		assert_eq!(resp.seid(), Some(77));
		assert_eq!(resp.cause_value(), Some(1));
		assert_eq!(resp.f_seid().unwrap().unwrap().seid, 1);

		let modify = PFCPMessage::new(MsgType::SessionModificationRequest, Some(1), 2, vec![]);
		assert_eq!(upf.respond(&modify).unwrap().cause_value(), Some(1));
		let unknown = PFCPMessage::new(MsgType::SessionModificationRequest, Some(9), 3, vec![]);
		assert_eq!(upf.respond(&unknown).unwrap().cause_value(), Some(65));

		let delete = PFCPMessage::session_deletion_request(4, 1);
		let resp = upf.respond(&delete).unwrap();
		assert_eq!(resp.seid(), Some(77));
		assert_eq!(upf.session_count(), 0);
		assert_eq!(upf.respond(&delete).unwrap().cause_value(), Some(65));
		assert_eq!(upf.received().len(), 5);
	}

	#[test]
	fn test_establishment_without_fseid() {
		let upf = MockUpf::new("10.0.0.2".parse().unwrap());
		let req = PFCPMessage::new(MsgType::SessionEstablishmentRequest, Some(0), 1, vec![]);
		assert_eq!(upf.respond(&req).unwrap().cause_value(), Some(66));
	}

	#[test]
	fn test_reject_and_drop() {
		let upf = MockUpf::new("10.0.0.2".parse().unwrap());
		upf.set_reject_establishment(true);
		upf.drop_first(1);
		assert!(upf.respond(&establishment(5, 1)).is_none());
		let resp = upf.respond(&establishment(5, 1)).unwrap();
		assert_eq!(resp.cause_value(), Some(64));
		assert!(resp.f_seid().unwrap().is_none());
		assert_eq!(upf.session_count(), 0);
	}

	#[test]
	fn test_unsupported_request_is_ignored() {
		let upf = MockUpf::new("10.0.0.2".parse().unwrap());
		let req = PFCPMessage::new(MsgType::NodeReportRequest, None, 1, vec![]);
		assert!(upf.respond(&req).is_none());
	}

	#[tokio::test]
	async fn test_serve_over_udp() {
		let upf = MockUpf::new("127.0.0.1".parse().unwrap());
		let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
		let addr = socket.local_addr().unwrap();
		let token = CancellationToken::new();
		let server = tokio::spawn(upf.clone().serve(socket, token.clone()));

		let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let req = PFCPMessage::heartbeat_request(3, &RecoveryTimeStamp { timestamp: 1 });
		client.send_to(&req.encode().unwrap(), addr).await.unwrap();
		let mut buf = [0u8; 1500];
		let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(5), client.recv_from(&mut buf))
			.await
			.unwrap()
			.unwrap();
		let resp = PFCPMessage::decode(&buf[..n]).unwrap();
		assert_eq!(resp.msg_type(), MsgType::HeartbeatResponse as u8);
		assert_eq!(resp.seq(), 3);

		token.cancel();
		server.await.unwrap();
	}
}
