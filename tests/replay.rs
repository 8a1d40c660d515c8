use std::{io::Write, net::Ipv4Addr, sync::Arc, time::Duration};

use libpfcp::{
	models::{Cause, RecoveryTimeStamp, UE_IPAddress, UE_IPAddressFlags, F_SEID, IE_CREATE_PDR, IE_PDI, PDR_ID},
	MsgType, PFCPMessage, IE, PFCP_PORT,
};
use pnet::packet::{
	ethernet::{EtherTypes, MutableEthernetPacket},
	ip::IpNextHeaderProtocols,
	ipv4::MutableIpv4Packet,
	udp::MutableUdpPacket,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use pfcp_replay::{
	mockupf::MockUpf,
	n4::{run_receiver, TransactionTracker, UdpTransport},
	pcap,
	session::{IpPool, ManagerOptions, SeidAllocator, SeidStrategy, SessionManager},
	stats::Collector,
};

const SMF: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const UPF: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

fn frame(src: Ipv4Addr, dst: Ipv4Addr, msg: &PFCPMessage) -> Vec<u8> {
	let payload = msg.encode().unwrap();
	let mut buffer = vec![0u8; 14 + 20 + 8 + payload.len()];
	{
		let mut eth = MutableEthernetPacket::new(&mut buffer[..14]).unwrap();
		eth.set_ethertype(EtherTypes::Ipv4);
	}
	{
		let mut ip = MutableIpv4Packet::new(&mut buffer[14..34]).unwrap();
		ip.set_version(4);
		ip.set_header_length(5);
		ip.set_total_length((28 + payload.len()) as u16);
		ip.set_ttl(64);
		ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
		ip.set_source(src);
		ip.set_destination(dst);
	}
	{
		let mut udp = MutableUdpPacket::new(&mut buffer[34..]).unwrap();
		udp.set_source(PFCP_PORT);
		udp.set_destination(PFCP_PORT);
		udp.set_length((8 + payload.len()) as u16);
		udp.set_payload(&payload);
	}
	buffer
}

fn write_capture(frames: &[Vec<u8>]) -> tempfile::NamedTempFile {
	let mut data = Vec::new();
	data.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
	data.extend_from_slice(&2u16.to_le_bytes());
	data.extend_from_slice(&4u16.to_le_bytes());
	data.extend_from_slice(&[0; 8]);
	data.extend_from_slice(&65535u32.to_le_bytes());
	data.extend_from_slice(&1u32.to_le_bytes());
	for (i, f) in frames.iter().enumerate() {
		data.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
		data.extend_from_slice(&0u32.to_le_bytes());
		data.extend_from_slice(&(f.len() as u32).to_le_bytes());
		data.extend_from_slice(&(f.len() as u32).to_le_bytes());
		data.extend_from_slice(f);
	}
	let mut file = tempfile::NamedTempFile::new().unwrap();
	file.write_all(&data).unwrap();
	file
}

fn establishment(seq: u32, cp_seid: u64) -> PFCPMessage {
	let mut ue = UE_IPAddress::new();
	ue.flags = UE_IPAddressFlags(0x02);
	ue.ipv4 = Some(Ipv4Addr::new(10, 45, 0, 1));
	let pdi = IE::grouped(IE_PDI, &[IE::new(20, vec![0]), IE::from_model(&ue)]).unwrap();
	let pdr = IE::grouped(IE_CREATE_PDR, &[IE::from_model(&PDR_ID { rule_id: 1 }), pdi]).unwrap();
	PFCPMessage::new(
		MsgType::SessionEstablishmentRequest,
		Some(0),
		seq,
		vec![IE::from_model(&F_SEID::new(SMF.into(), cp_seid)), pdr],
	)
}

fn establishment_response(seq: u32, cp_seid: u64, up_seid: u64) -> PFCPMessage {
	PFCPMessage::session_establishment_response(
		seq,
		cp_seid,
		UPF.into(),
		Cause::RequestAccepted,
		Some(&F_SEID::new(UPF.into(), up_seid)),
	)
}

/// Two sessions, the second one modified, both deleted
fn full_recording() -> Vec<Vec<u8>> {
	let recovery = RecoveryTimeStamp { timestamp: 3_900_000_000 };
	vec![
		frame(SMF, UPF, &PFCPMessage::association_setup_request(1, SMF.into(), &recovery)),
		frame(SMF, UPF, &PFCPMessage::heartbeat_request(2, &recovery)),
		frame(SMF, UPF, &establishment(3, 0x1001)),
		frame(UPF, SMF, &establishment_response(3, 0x1001, 0xa001)),
		frame(SMF, UPF, &establishment(4, 0x1002)),
		frame(UPF, SMF, &establishment_response(4, 0x1002, 0xa002)),
		frame(
			SMF,
			UPF,
			&PFCPMessage::new(MsgType::SessionModificationRequest, Some(0xa002), 5, vec![]),
		),
		frame(SMF, UPF, &PFCPMessage::session_deletion_request(6, 0xa001)),
		frame(SMF, UPF, &PFCPMessage::session_deletion_request(7, 0xa002)),
	]
}

struct Harness {
	upf: MockUpf,
	manager: SessionManager,
	stats: Arc<Collector>,
	token: CancellationToken,
}

impl Harness {
	async fn start(upf: MockUpf, options: ManagerOptions, timeout: Duration) -> Harness {
		let token = CancellationToken::new();
		let upf_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
		let upf_addr = upf_socket.local_addr().unwrap();
		tokio::spawn(upf.clone().serve(upf_socket, token.clone()));

		let stats = Arc::new(Collector::new());
		let transport = Arc::new(
			UdpTransport::bind("127.0.0.1:0".parse().unwrap(), upf_addr)
				.await
				.unwrap(),
		);
		let tracker = Arc::new(TransactionTracker::new(transport.clone(), stats.clone(), timeout, 3));
		tokio::spawn(run_receiver(transport.socket(), transport.peer(), tracker.clone(), token.clone()));
		tokio::spawn(tracker.clone().run_sweeper(token.clone()));

		let manager = SessionManager::new(
			options,
			SeidAllocator::new(SeidStrategy::Sequential, 0x5000),
			IpPool::new("10.60.0.0/24", true).unwrap(),
			tracker,
			stats.clone(),
		);
		Harness {
			upf,
			manager,
			stats,
			token,
		}
	}

	fn session_requests(&self) -> Vec<PFCPMessage> {
		self.upf
			.received()
			.into_iter()
			.filter(|m| m.msg_type() >= MsgType::SessionEstablishmentRequest as u8)
			.collect()
	}
}

impl Drop for Harness {
	fn drop(&mut self) {
		self.token.cancel();
	}
}

fn options() -> ManagerOptions {
	ManagerOptions {
		smf_ip: Some("127.0.0.1".parse().unwrap()),
		..Default::default()
	}
}

#[tokio::test]
async fn replays_capture_against_live_peer() {
	let capture = write_capture(&full_recording());
	let parsed = pcap::parse_with_mappings(capture.path()).unwrap();
	assert_eq!(parsed.messages.len(), 7);
	assert_eq!(parsed.seid_mappings.len(), 2);

	let upf = MockUpf::new("127.0.0.1".parse().unwrap());
	let mut h = Harness::start(upf, options(), Duration::from_secs(2)).await;
	h.manager.set_seid_mappings(&parsed.seid_mappings);
	h.manager.replay(&parsed.messages, &h.token).await.unwrap();

	let sent = h.session_requests();
	assert_eq!(sent.len(), 5);
	// establishments carry our CP F-SEID and address
	let f_seid = sent[0].f_seid().unwrap().unwrap();
	assert_eq!(f_seid.seid, 0x5000);
	assert_eq!(f_seid.ipv4, Some(Ipv4Addr::LOCALHOST));
	assert_eq!(sent[1].f_seid().unwrap().unwrap().seid, 0x5001);
	// the recorded 0xa002 names the second session, the mock assigned it UP SEID 2
	assert_eq!(sent[2].msg_type(), MsgType::SessionModificationRequest as u8);
	assert_eq!(sent[2].seid(), Some(2));
	assert_eq!(sent[3].seid(), Some(1));
	assert_eq!(sent[4].seid(), Some(2));

	assert_eq!(h.upf.session_count(), 0);
	assert!(h.manager.sessions().is_empty());

	let snapshot = h.stats.snapshot();
	assert_eq!(snapshot.sessions.established, 2);
	assert_eq!(snapshot.sessions.modified, 1);
	assert_eq!(snapshot.sessions.deleted, 2);
	assert_eq!(snapshot.sessions.active, 0);
	assert_eq!(snapshot.total_sent(), 7);
	assert_eq!(snapshot.total_received(), 7);
	assert_eq!(snapshot.messages["AssociationSetupRequest"].success, 1);
	assert!(snapshot.response_times_ms.is_some());
}

#[tokio::test]
async fn rejected_establishment_skips_dependent_messages() {
	let capture = write_capture(&full_recording());
	let parsed = pcap::parse_with_mappings(capture.path()).unwrap();

	let upf = MockUpf::new("127.0.0.1".parse().unwrap());
	upf.set_reject_establishment(true);
	let mut h = Harness::start(upf, options(), Duration::from_secs(2)).await;
	h.manager.set_seid_mappings(&parsed.seid_mappings);
	h.manager.replay(&parsed.messages, &h.token).await.unwrap();

	// only the two establishments reach the peer
	assert_eq!(h.session_requests().len(), 2);
	let snapshot = h.stats.snapshot();
	assert_eq!(snapshot.sessions.failed, 2);
	assert_eq!(snapshot.sessions.established, 0);
	assert_eq!(snapshot.messages["SessionEstablishmentRequest"].failed, 2);
	assert_eq!(h.manager.ip_pool().allocated_count(), 0);
	assert_eq!(h.manager.seid_allocator().allocated_count(), 0);
}

#[tokio::test]
async fn silent_peer_gets_retransmissions() {
	let recording = vec![frame(SMF, UPF, &establishment(9, 0x77))];
	let capture = write_capture(&recording);
	let parsed = pcap::parse_with_mappings(capture.path()).unwrap();

	let upf = MockUpf::new("127.0.0.1".parse().unwrap());
	upf.drop_first(2);
	let h = Harness::start(upf, options(), Duration::from_millis(150)).await;
	h.manager.replay(&parsed.messages, &h.token).await.unwrap();

	let attempts = h.session_requests();
	assert_eq!(attempts.len(), 3);
	// retransmissions are byte-identical
	assert!(attempts.iter().all(|m| m == &attempts[0]));
	let snapshot = h.stats.snapshot();
	assert_eq!(snapshot.messages["SessionEstablishmentRequest"].retransmits, 2);
	assert_eq!(snapshot.messages["SessionEstablishmentRequest"].success, 1);
	assert_eq!(snapshot.sessions.established, 1);
	assert_eq!(h.manager.active_session_count(), 1);
}

#[tokio::test]
async fn cleanup_removes_leftover_sessions() {
	let recording = vec![
		frame(SMF, UPF, &establishment(1, 0x10)),
		frame(SMF, UPF, &establishment(2, 0x11)),
		frame(SMF, UPF, &establishment(3, 0x12)),
	];
	let capture = write_capture(&recording);
	let parsed = pcap::parse_with_mappings(capture.path()).unwrap();
	assert!(!pcap::has_deletion_requests(&parsed.messages));

	let upf = MockUpf::new("127.0.0.1".parse().unwrap());
	let h = Harness::start(upf, options(), Duration::from_secs(2)).await;
	h.manager.replay(&parsed.messages, &h.token).await.unwrap();
	assert_eq!(h.upf.session_count(), 3);

	let deleted = h.manager.cleanup_sessions(&CancellationToken::new()).await;
	assert_eq!(deleted, 3);
	assert_eq!(h.upf.session_count(), 0);
	assert_eq!(h.stats.snapshot().sessions.active, 0);
}
