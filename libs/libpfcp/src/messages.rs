use std::net::IpAddr;

use crate::helpers::{decode_ies, encode_ies, ENTERPRISE_BIT};
use crate::models::*;
use crate::{PFCPError, PFCPModel};

/// Raw TLV information element.
///
/// The value is kept exactly as received so that an IE which is not touched
/// re-encodes to the same octets. Grouped IEs are read through [`IE::children`]
/// and rebuilt through [`IE::grouped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IE {
	pub ie_type: u16,
	pub value: Vec<u8>,
}

impl IE {
	pub fn new(ie_type: u16, value: Vec<u8>) -> IE {
		IE { ie_type, value }
	}
	/// Wrap a typed IE
	pub fn from_model<T: PFCPModel>(model: &T) -> IE {
		let encoded = model.encode();
		IE {
			ie_type: T::ID,
			value: encoded[4..].to_vec(),
		}
	}
	/// Build a grouped IE from its children, in the given order
	pub fn grouped(ie_type: u16, children: &[IE]) -> Result<IE, PFCPError> {
		let value = encode_ies(children);
		if value.len() > u16::MAX as usize {
			return Err(PFCPError::new(&format!(
				"Grouped IE type {} would be {} octets long",
				ie_type,
				value.len()
			)));
		}
		Ok(IE { ie_type, value })
	}
	pub fn children(&self) -> Result<Vec<IE>, PFCPError> {
		decode_ies(&self.value)
	}
	/// Decode the value as a typed IE
	pub fn parse<T: PFCPModel>(&self) -> Result<T, PFCPError> {
		if self.ie_type != T::ID {
			return Err(PFCPError::new(&format!(
				"IE type {} cannot be parsed as type {}",
				self.ie_type,
				T::ID
			)));
		}
		T::decode(&self.value)
	}
	pub fn is_enterprise(&self) -> bool {
		self.ie_type & ENTERPRISE_BIT != 0
	}
	pub fn encoded_len(&self) -> usize {
		4 + self.value.len()
	}
	pub fn encode_into(&self, buf: &mut Vec<u8>) {
		buf.extend_from_slice(&self.ie_type.to_be_bytes());
		buf.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
		buf.extend_from_slice(&self.value);
	}
	pub fn encode(&self) -> Vec<u8> {
		let mut ret = Vec::with_capacity(self.encoded_len());
		self.encode_into(&mut ret);
		ret
	}
}

/// A PFCP message: header followed by a flat list of top level IEs.
#[derive(Debug, Clone, PartialEq)]
pub struct PFCPMessage {
	pub header: PFCPHeader,
	pub ies: Vec<IE>,
}

impl PFCPMessage {
	pub fn new(msg_type: MsgType, seid: Option<u64>, seq: u32, ies: Vec<IE>) -> PFCPMessage {
		PFCPMessage {
			header: PFCPHeader::new(msg_type as u8, seid, seq),
			ies,
		}
	}
	/// Decode the first message in `stream`, ignoring anything after it
	pub fn decode(stream: &[u8]) -> Result<PFCPMessage, PFCPError> {
		let (body, _rest, header) = PFCPHeader::decode(stream)?;
		let ies = decode_ies(&body)?;
		Ok(PFCPMessage { header, ies })
	}
	/// Encode with the length field recomputed from the body
	pub fn encode(&self) -> Result<Vec<u8>, PFCPError> {
		let body = encode_ies(&self.ies);
		let length = body.len() + self.header.encoded_len() - 4;
		if length > u16::MAX as usize {
			return Err(PFCPError::new(&format!(
				"Message body of {} octets does not fit the length field",
				body.len()
			)));
		}
		let mut header = self.header.clone();
		header.length = length as u16;
		let mut ret = header.encode();
		ret.extend_from_slice(&body);
		Ok(ret)
	}
	pub fn msg_type(&self) -> u8 {
		self.header.msg_type
	}
	pub fn type_name(&self) -> &'static str {
		message_type_name(self.header.msg_type)
	}
	pub fn seid(&self) -> Option<u64> {
		self.header.seid
	}
	pub fn seq(&self) -> u32 {
		self.header.seq
	}
	pub fn find(&self, ie_type: u16) -> Option<&IE> {
		self.ies.iter().find(|ie| ie.ie_type == ie_type)
	}
	/// Raw cause value, kept raw so unknown causes still read as rejections
	pub fn cause_value(&self) -> Option<u8> {
		self.find(Cause::ID).and_then(|ie| ie.value.first().copied())
	}
	pub fn f_seid(&self) -> Result<Option<F_SEID>, PFCPError> {
		match self.find(F_SEID::ID) {
			Some(ie) => Ok(Some(ie.parse::<F_SEID>()?)),
			None => Ok(None),
		}
	}
	pub fn node_id(&self) -> Result<Option<NodeID>, PFCPError> {
		match self.find(NodeID::ID) {
			Some(ie) => Ok(Some(ie.parse::<NodeID>()?)),
			None => Ok(None),
		}
	}

	pub fn heartbeat_request(seq: u32, recovery: &RecoveryTimeStamp) -> PFCPMessage {
		PFCPMessage::new(MsgType::HeartbeatRequest, None, seq, vec![IE::from_model(recovery)])
	}
	pub fn heartbeat_response(seq: u32, recovery: &RecoveryTimeStamp) -> PFCPMessage {
		PFCPMessage::new(MsgType::HeartbeatResponse, None, seq, vec![IE::from_model(recovery)])
	}
	pub fn association_setup_request(seq: u32, node_ip: IpAddr, recovery: &RecoveryTimeStamp) -> PFCPMessage {
		PFCPMessage::new(
			MsgType::AssociationSetupRequest,
			None,
			seq,
			vec![IE::from_model(&NodeID::from_ip(node_ip)), IE::from_model(recovery)],
		)
	}
	pub fn association_setup_response(
		seq: u32,
		node_ip: IpAddr,
		cause: Cause,
		recovery: &RecoveryTimeStamp,
	) -> PFCPMessage {
		PFCPMessage::new(
			MsgType::AssociationSetupResponse,
			None,
			seq,
			vec![
				IE::from_model(&NodeID::from_ip(node_ip)),
				IE::from_model(&cause),
				IE::from_model(recovery),
			],
		)
	}
	pub fn session_establishment_response(
		seq: u32,
		cp_seid: u64,
		node_ip: IpAddr,
		cause: Cause,
		up_f_seid: Option<&F_SEID>,
	) -> PFCPMessage {
		let mut ies = vec![IE::from_model(&NodeID::from_ip(node_ip)), IE::from_model(&cause)];
		if let Some(f_seid) = up_f_seid {
			ies.push(IE::from_model(f_seid));
		}
		PFCPMessage::new(MsgType::SessionEstablishmentResponse, Some(cp_seid), seq, ies)
	}
	/// Modification or deletion response carrying only a cause
	pub fn session_response(msg_type: MsgType, seq: u32, cp_seid: u64, cause: Cause) -> PFCPMessage {
		PFCPMessage::new(msg_type, Some(cp_seid), seq, vec![IE::from_model(&cause)])
	}
	pub fn session_deletion_request(seq: u32, remote_seid: u64) -> PFCPMessage {
		PFCPMessage::new(MsgType::SessionDeletionRequest, Some(remote_seid), seq, vec![])
	}
	/// Response to `request`: same sequence number, type + 1, no priority
	pub fn response_to(request: &PFCPMessage, seid: Option<u64>, ies: Vec<IE>) -> PFCPMessage {
		let mut header = request.header.clone();
		header.msg_type += 1;
		header.priority = None;
		header.seid = seid;
		PFCPMessage { header, ies }
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::net::Ipv4Addr;

	fn establishment_bytes() -> Vec<u8> {
		let mut ue = UE_IPAddress::new();
		ue.flags.setV4(1);
		ue.flags.setSD(1);
		ue.ipv4 = Some(Ipv4Addr::new(10, 60, 0, 1));
		let pdi = IE::grouped(
			IE_PDI,
			&[IE::new(20, vec![0]), IE::new(IE_F_TEID, vec![0x05]), IE::from_model(&ue)],
		)
		.unwrap();
		let pdr = IE::grouped(IE_CREATE_PDR, &[IE::from_model(&PDR_ID { rule_id: 1 }), pdi]).unwrap();
		let msg = PFCPMessage::new(
			MsgType::SessionEstablishmentRequest,
			Some(0),
			42,
			vec![
				IE::from_model(&NodeID::from_ip("10.0.0.1".parse().unwrap())),
				IE::from_model(&F_SEID::new("10.0.0.1".parse().unwrap(), 77)),
				pdr,
				// vendor specific IE, enterprise ID 0x1234
				IE::new(0x8001, vec![0x12, 0x34, 0xde, 0xad]),
			],
		);
		msg.encode().unwrap()
	}

	#[test]
	fn test_message_decode_encode_is_byte_identical() {
		let bytes = establishment_bytes();
		let msg = PFCPMessage::decode(&bytes).unwrap();
		assert_eq!(msg.msg_type(), 50);
		assert_eq!(msg.seid(), Some(0));
		assert_eq!(msg.seq(), 42);
		assert_eq!(msg.f_seid().unwrap().unwrap().seid, 77);
		assert!(msg.ies[3].is_enterprise());
		assert_eq!(msg.encode().unwrap(), bytes);
	}

	#[test]
	fn test_grouped_children() {
		let msg = PFCPMessage::decode(&establishment_bytes()).unwrap();
		let pdr = msg.find(IE_CREATE_PDR).unwrap();
		let children = pdr.children().unwrap();
		assert_eq!(children.len(), 2);
		assert_eq!(children[0].parse::<PDR_ID>().unwrap().rule_id, 1);
		let pdi_children = children[1].children().unwrap();
		let ue = pdi_children[2].parse::<UE_IPAddress>().unwrap();
		assert_eq!(ue.ipv4, Some(Ipv4Addr::new(10, 60, 0, 1)));
		let rebuilt = IE::grouped(IE_CREATE_PDR, &children).unwrap();
		assert_eq!(&rebuilt, pdr);
	}

	#[test]
	fn test_trailing_bytes_ignored() {
		let mut bytes = establishment_bytes();
		let original_len = bytes.len();
		bytes.extend_from_slice(&[0xff; 7]);
		let msg = PFCPMessage::decode(&bytes).unwrap();
		assert_eq!(msg.encode().unwrap().len(), original_len);
	}

	#[test]
	fn test_parse_wrong_type() {
		let ie = IE::new(19, vec![1]);
		assert!(ie.parse::<F_SEID>().is_err());
		assert_eq!(ie.parse::<Cause>().unwrap(), Cause::RequestAccepted);
	}

	#[test]
	fn test_session_response_builders() {
		let resp = PFCPMessage::session_response(MsgType::SessionDeletionResponse, 9, 1234, Cause::RequestAccepted);
		let decoded = PFCPMessage::decode(&resp.encode().unwrap()).unwrap();
		assert_eq!(decoded.msg_type(), 55);
		assert_eq!(decoded.seid(), Some(1234));
		assert_eq!(decoded.cause_value(), Some(1));

		let req = PFCPMessage::heartbeat_request(77, &RecoveryTimeStamp { timestamp: 5 });
		let resp = PFCPMessage::response_to(&req, None, vec![]);
		assert_eq!(resp.msg_type(), 2);
		assert_eq!(resp.seq(), 77);

		let del = PFCPMessage::session_deletion_request(3, 55);
		let bytes = del.encode().unwrap();
		assert_eq!(bytes.len(), 16);
		assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 12);
	}
}
