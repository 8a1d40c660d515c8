//! Recording reader: pulls PFCP requests out of a libpcap capture file.

use std::{
	collections::BTreeMap,
	convert::TryInto,
	fs,
	net::IpAddr,
	path::Path,
};

use chrono::{DateTime, Utc};
use libpfcp::{models::message_type_name, MsgType, PFCPHeader, PFCPMessage, PFCP_PORT};
use log::{debug, info, warn};
use pnet::packet::{
	ethernet::{EtherType, EtherTypes, EthernetPacket},
	ip::IpNextHeaderProtocols,
	ipv4::{Ipv4Flags, Ipv4Packet},
	ipv6::Ipv6Packet,
	udp::UdpPacket,
	vlan::VlanPacket,
	Packet,
};

use crate::{
	error::{ReplayError, Result},
	session::SeidMapping,
};

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const MAGIC_PCAPNG: u32 = 0x0a0d_0d0a;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW_BSD: u32 = 12;
const LINKTYPE_RAW: u32 = 101;
const LINKTYPE_LINUX_SLL: u32 = 113;
const LINKTYPE_IPV4: u32 = 228;
const LINKTYPE_IPV6: u32 = 229;

const SLL_HEADER_LEN: usize = 16;
const VLAN_ETHERTYPES: [u16; 3] = [0x8100, 0x88a8, 0x9100];

/// One PFCP request as captured
#[derive(Debug, Clone, PartialEq)]
pub struct RawPFCPMessage {
	pub data: Vec<u8>,
	pub timestamp: DateTime<Utc>,
	pub src_ip: IpAddr,
	pub dst_ip: IpAddr,
	pub src_port: u16,
	pub dst_port: u16,
}

#[derive(Debug, Default)]
pub struct ParseResult {
	/// Requests in capture order
	pub messages: Vec<RawPFCPMessage>,
	/// Mined from the recorded establishment responses
	pub seid_mappings: Vec<SeidMapping>,
}

struct CaptureFile {
	data: Vec<u8>,
	big_endian: bool,
	nanos: bool,
	link_type: u32,
}

struct Record<'a> {
	timestamp: DateTime<Utc>,
	frame: &'a [u8],
}

impl CaptureFile {
	fn open(path: &Path) -> Result<CaptureFile> {
		let data = fs::read(path)
			.map_err(|e| ReplayError::Pcap(format!("failed to open pcap file {}: {}", path.display(), e)))?;
		CaptureFile::from_bytes(data)
	}

	fn from_bytes(data: Vec<u8>) -> Result<CaptureFile> {
		if data.len() < GLOBAL_HEADER_LEN {
			return Err(ReplayError::Pcap(format!(
				"file too short for a pcap header ({} octets)",
				data.len()
			)));
		}
		let magic_le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
		let (big_endian, nanos) = match (magic_le, magic_le.swap_bytes()) {
			(MAGIC_MICROS, _) => (false, false),
			(MAGIC_NANOS, _) => (false, true),
			(_, MAGIC_MICROS) => (true, false),
			(_, MAGIC_NANOS) => (true, true),
			(MAGIC_PCAPNG, _) => {
				return Err(ReplayError::Pcap(
					"pcapng captures are not supported, convert with `editcap -F pcap`".to_string(),
				))
			}
			_ => return Err(ReplayError::Pcap(format!("unknown capture magic {:#010x}", magic_le))),
		};
		let mut capture = CaptureFile {
			data,
			big_endian,
			nanos,
			link_type: 0,
		};
		capture.link_type = capture.u32_at(20);
		debug!("PCAP link type {}", capture.link_type);
		Ok(capture)
	}

	fn u32_at(&self, offset: usize) -> u32 {
		let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap_or_default();
		if self.big_endian {
			u32::from_be_bytes(bytes)
		} else {
			u32::from_le_bytes(bytes)
		}
	}

	fn records(&self) -> Vec<Record<'_>> {
		let mut ret = Vec::new();
		let mut offset = GLOBAL_HEADER_LEN;
		while offset < self.data.len() {
			if offset + RECORD_HEADER_LEN > self.data.len() {
				warn!("Truncated record header at offset {}, stopping", offset);
				break;
			}
			let secs = self.u32_at(offset);
			let frac = self.u32_at(offset + 4);
			let incl_len = self.u32_at(offset + 8) as usize;
			let start = offset + RECORD_HEADER_LEN;
			if start + incl_len > self.data.len() {
				warn!("Truncated packet at offset {}, stopping", offset);
				break;
			}
			let nanos = if self.nanos { frac } else { frac.saturating_mul(1000) };
			ret.push(Record {
				timestamp: DateTime::<Utc>::from_timestamp(secs as i64, nanos).unwrap_or_default(),
				frame: &self.data[start..start + incl_len],
			});
			offset = start + incl_len;
		}
		ret
	}
}

struct UdpDatagram {
	src_ip: IpAddr,
	dst_ip: IpAddr,
	src_port: u16,
	dst_port: u16,
	payload: Vec<u8>,
}

impl UdpDatagram {
	fn is_pfcp(&self) -> bool {
		(self.src_port == PFCP_PORT || self.dst_port == PFCP_PORT) && !self.payload.is_empty()
	}
}

fn extract_udp(link_type: u32, frame: &[u8]) -> Option<UdpDatagram> {
	match link_type {
		LINKTYPE_ETHERNET => {
			let eth = EthernetPacket::new(frame)?;
			from_ethertype(eth.get_ethertype(), eth.payload())
		}
		LINKTYPE_LINUX_SLL => {
			// cooked header, protocol in the last two of 16 octets
			if frame.len() < SLL_HEADER_LEN {
				return None;
			}
			let protocol = u16::from_be_bytes([frame[14], frame[15]]);
			from_ethertype(EtherType(protocol), &frame[SLL_HEADER_LEN..])
		}
		LINKTYPE_RAW | LINKTYPE_RAW_BSD => match frame.first()? >> 4 {
			4 => from_ipv4(frame),
			6 => from_ipv6(frame),
			_ => None,
		},
		LINKTYPE_IPV4 => from_ipv4(frame),
		LINKTYPE_IPV6 => from_ipv6(frame),
		_ => None,
	}
}

fn from_ethertype(ethertype: EtherType, payload: &[u8]) -> Option<UdpDatagram> {
	if VLAN_ETHERTYPES.contains(&ethertype.0) {
		let vlan = VlanPacket::new(payload)?;
		return from_ethertype(vlan.get_ethertype(), vlan.payload());
	}
	if ethertype == EtherTypes::Ipv4 {
		from_ipv4(payload)
	} else if ethertype == EtherTypes::Ipv6 {
		from_ipv6(payload)
	} else {
		None
	}
}

fn from_ipv4(buf: &[u8]) -> Option<UdpDatagram> {
	let ip = Ipv4Packet::new(buf)?;
	if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
		return None;
	}
	if ip.get_fragment_offset() != 0 || ip.get_flags() & Ipv4Flags::MoreFragments != 0 {
		return None;
	}
	let header_len = ip.get_header_length() as usize * 4;
	let total_len = (ip.get_total_length() as usize).min(buf.len());
	if header_len < 20 || total_len < header_len {
		return None;
	}
	from_udp(
		IpAddr::V4(ip.get_source()),
		IpAddr::V4(ip.get_destination()),
		&buf[header_len..total_len],
	)
}

fn from_ipv6(buf: &[u8]) -> Option<UdpDatagram> {
	let ip = Ipv6Packet::new(buf)?;
	if ip.get_next_header() != IpNextHeaderProtocols::Udp {
		return None;
	}
	let end = (40 + ip.get_payload_length() as usize).min(buf.len());
	from_udp(IpAddr::V6(ip.get_source()), IpAddr::V6(ip.get_destination()), &buf[40..end])
}

fn from_udp(src_ip: IpAddr, dst_ip: IpAddr, buf: &[u8]) -> Option<UdpDatagram> {
	let udp = UdpPacket::new(buf)?;
	let length = udp.get_length() as usize;
	if length < 8 {
		return None;
	}
	Some(UdpDatagram {
		src_ip,
		dst_ip,
		src_port: udp.get_source(),
		dst_port: udp.get_destination(),
		payload: buf[8..length.min(buf.len())].to_vec(),
	})
}

/// Every PFCP request in the capture plus the SEID mappings of its establishment responses
pub fn parse_with_mappings(path: &Path) -> Result<ParseResult> {
	let capture = CaptureFile::open(path)?;
	let mut result = ParseResult::default();
	let mut total_packets = 0usize;
	let mut pfcp_packets = 0usize;

	for record in capture.records() {
		total_packets += 1;
		let datagram = match extract_udp(capture.link_type, record.frame) {
			Some(d) if d.is_pfcp() => d,
			_ => continue,
		};
		pfcp_packets += 1;

		let msg = match PFCPMessage::decode(&datagram.payload) {
			Ok(m) => m,
			Err(e) => {
				warn!("Failed to decode PFCP message in packet {}, skipping: {}", total_packets, e);
				continue;
			}
		};

		if msg.msg_type() == MsgType::SessionEstablishmentResponse as u8 {
			if let Ok(Some(up_f_seid)) = msg.f_seid() {
				let mapping = SeidMapping {
					original_local_seid: msg.seid().unwrap_or(0),
					original_remote_seid: up_f_seid.seid,
				};
				debug!(
					"Packet {}: SEID mapping cp={:#x} up={:#x}",
					total_packets, mapping.original_local_seid, mapping.original_remote_seid
				);
				result.seid_mappings.push(mapping);
			}
		}

		if !msg.header.is_request() {
			debug!("Packet {}: skipping {}", total_packets, msg.type_name());
			continue;
		}
		debug!(
			"Packet {}: {} {}:{} -> {}:{}",
			total_packets,
			msg.type_name(),
			datagram.src_ip,
			datagram.src_port,
			datagram.dst_ip,
			datagram.dst_port
		);
		result.messages.push(RawPFCPMessage {
			data: datagram.payload,
			timestamp: record.timestamp,
			src_ip: datagram.src_ip,
			dst_ip: datagram.dst_ip,
			src_port: datagram.src_port,
			dst_port: datagram.dst_port,
		});
	}

	info!(
		"PCAP parsing complete: total_packets={} pfcp_packets={} request_packets={} seid_mappings={}",
		total_packets,
		pfcp_packets,
		result.messages.len(),
		result.seid_mappings.len()
	);
	Ok(result)
}

pub fn parse(path: &Path) -> Result<Vec<RawPFCPMessage>> {
	Ok(parse_with_mappings(path)?.messages)
}

/// Number of decodable PFCP messages per type name, requests and responses alike
pub fn count_messages(path: &Path) -> Result<BTreeMap<String, usize>> {
	let capture = CaptureFile::open(path)?;
	let mut counts = BTreeMap::new();
	for record in capture.records() {
		let datagram = match extract_udp(capture.link_type, record.frame) {
			Some(d) if d.is_pfcp() => d,
			_ => continue,
		};
		if let Ok((_, _, header)) = PFCPHeader::decode(&datagram.payload) {
			*counts.entry(message_type_name(header.msg_type).to_string()).or_insert(0) += 1;
		}
	}
	Ok(counts)
}

fn message_types(messages: &[RawPFCPMessage]) -> impl Iterator<Item = u8> + '_ {
	messages
		.iter()
		.filter_map(|raw| PFCPHeader::decode(&raw.data).ok())
		.map(|(_, _, header)| header.msg_type)
}

pub fn validate_has_establishment(messages: &[RawPFCPMessage]) -> Result<()> {
	if message_types(messages).any(|t| t == MsgType::SessionEstablishmentRequest as u8) {
		Ok(())
	} else {
		Err(ReplayError::Pcap(
			"pcap file does not contain any Session Establishment Request messages".to_string(),
		))
	}
}

pub fn has_deletion_requests(messages: &[RawPFCPMessage]) -> bool {
	message_types(messages).any(|t| t == MsgType::SessionDeletionRequest as u8)
}

#[cfg(test)]
pub(crate) mod test_util {
	use std::{io::Write, net::Ipv4Addr};

	use pnet::packet::{
		ethernet::MutableEthernetPacket, ip::IpNextHeaderProtocols, ipv4::MutableIpv4Packet, udp::MutableUdpPacket,
	};

	use super::*;

	/// Ethernet + IPv4 + UDP around `payload`
	pub fn udp_frame(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
		let mut buffer = vec![0u8; 14 + 20 + 8 + payload.len()];
		{
			let mut eth = MutableEthernetPacket::new(&mut buffer[..14]).unwrap();
			eth.set_destination(pnet::util::MacAddr(0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb));
			eth.set_source(pnet::util::MacAddr(0x00, 0x11, 0x22, 0x33, 0x44, 0x55));
			eth.set_ethertype(EtherTypes::Ipv4);
		}
		{
			let mut ip = MutableIpv4Packet::new(&mut buffer[14..34]).unwrap();
			ip.set_version(4);
			ip.set_header_length(5);
			ip.set_total_length((20 + 8 + payload.len()) as u16);
			ip.set_ttl(64);
			ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
			ip.set_source(src);
			ip.set_destination(dst);
			let checksum = pnet::packet::ipv4::checksum(&ip.to_immutable());
			ip.set_checksum(checksum);
		}
		{
			let mut udp = MutableUdpPacket::new(&mut buffer[34..]).unwrap();
			udp.set_source(src_port);
			udp.set_destination(dst_port);
			udp.set_length((8 + payload.len()) as u16);
			udp.set_payload(payload);
		}
		buffer
	}

	/// Little endian microsecond capture
	pub fn write_pcap(link_type: u32, frames: &[Vec<u8>]) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		let mut data = Vec::new();
		data.extend_from_slice(&MAGIC_MICROS.to_le_bytes());
		data.extend_from_slice(&2u16.to_le_bytes());
		data.extend_from_slice(&4u16.to_le_bytes());
		data.extend_from_slice(&[0; 8]);
		data.extend_from_slice(&65535u32.to_le_bytes());
		data.extend_from_slice(&link_type.to_le_bytes());
		for (i, frame) in frames.iter().enumerate() {
			data.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
			data.extend_from_slice(&500u32.to_le_bytes());
			data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
			data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
			data.extend_from_slice(frame);
		}
		file.write_all(&data).unwrap();
		file
	}

	pub fn pfcp_frame(msg: &PFCPMessage) -> Vec<u8> {
		udp_frame(
			Ipv4Addr::new(192, 168, 1, 10),
			Ipv4Addr::new(192, 168, 1, 20),
			PFCP_PORT,
			PFCP_PORT,
			&msg.encode().unwrap(),
		)
	}
}
