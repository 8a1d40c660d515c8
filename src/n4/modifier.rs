use std::net::{IpAddr, Ipv4Addr};

use libpfcp::{
	models::{NodeID, UE_IPAddress, F_SEID, IE_CREATE_PDR, IE_PDI, IE_UPDATE_PDR},
	PFCPMessage, PFCPModel, IE,
};

use crate::error::{ReplayError, Result};

const UE_IP_V6: u8 = 0x01;
const UE_IP_V4: u8 = 0x02;
const UE_IP_IPV6D: u8 = 0x08;
const UE_IP_IP6PL: u8 = 0x40;

/// Rewrites the per-session fields of recorded requests.
///
/// Every rewrite builds a new message; the input is left as decoded. IEs that
/// are not targeted keep their exact octets, and grouped IEs on the path to a
/// rewritten UE IP Address are rebuilt from their children in original order.
#[derive(Debug, Clone)]
pub struct MessageModifier {
	smf_ip: Option<IpAddr>,
	node_id: Option<IpAddr>,
	strip_ipv6: bool,
}

impl MessageModifier {
	/// `smf_ip` goes into the CP F-SEID, `node_id` (falling back to `smf_ip`) into Node ID IEs
	pub fn new(smf_ip: Option<IpAddr>, node_id: Option<IpAddr>, strip_ipv6: bool) -> MessageModifier {
		MessageModifier {
			smf_ip,
			node_id: node_id.or(smf_ip),
			strip_ipv6,
		}
	}

	pub fn modify_heartbeat(&self, msg: &PFCPMessage, seq: u32) -> PFCPMessage {
		let mut out = msg.clone();
		out.header.set_seq(seq);
		out
	}

	pub fn modify_association_setup(&self, msg: &PFCPMessage, seq: u32) -> PFCPMessage {
		let mut out = msg.clone();
		out.header.set_seq(seq);
		self.replace_node_id(&mut out);
		out
	}

	pub fn modify_session_establishment(
		&self,
		msg: &PFCPMessage,
		local_seid: u64,
		ue_ip: Ipv4Addr,
		seq: u32,
	) -> Result<PFCPMessage> {
		let mut out = msg.clone();
		out.header.set_seid(0);
		out.header.set_seq(seq);

		let idx = out
			.ies
			.iter()
			.position(|ie| ie.ie_type == F_SEID::ID)
			.ok_or(ReplayError::FieldAbsent {
				field: "CP F-SEID",
				message: "SessionEstablishmentRequest",
			})?;
		let original = out.ies[idx].parse::<F_SEID>().map_err(|e| ReplayError::MalformedRewrite {
			field: "CP F-SEID",
			reason: e.to_string(),
		})?;
		let f_seid = match self.smf_ip {
			Some(ip) => F_SEID::new(ip, local_seid),
			None => F_SEID {
				seid: local_seid,
				..original
			},
		};
		out.ies[idx] = IE::from_model(&f_seid);

		self.rewrite_pdrs(&mut out, &[IE_CREATE_PDR], ue_ip)?;
		self.replace_node_id(&mut out);
		Ok(out)
	}

	/// Create and Update PDRs carrying a UE IP Address are pointed at `ue_ip`
	pub fn modify_session_modification(
		&self,
		msg: &PFCPMessage,
		remote_seid: u64,
		ue_ip: Option<Ipv4Addr>,
		seq: u32,
	) -> Result<PFCPMessage> {
		let mut out = msg.clone();
		out.header.set_seid(remote_seid);
		out.header.set_seq(seq);
		if let Some(ue_ip) = ue_ip {
			self.rewrite_pdrs(&mut out, &[IE_CREATE_PDR, IE_UPDATE_PDR], ue_ip)?;
		}
		Ok(out)
	}

	pub fn modify_session_deletion(&self, msg: &PFCPMessage, remote_seid: u64, seq: u32) -> PFCPMessage {
		let mut out = msg.clone();
		out.header.set_seid(remote_seid);
		out.header.set_seq(seq);
		out
	}

	fn replace_node_id(&self, msg: &mut PFCPMessage) {
		if let Some(ip) = self.node_id {
			for ie in msg.ies.iter_mut().filter(|ie| ie.ie_type == NodeID::ID) {
				*ie = IE::from_model(&NodeID::from_ip(ip));
			}
		}
	}

	fn rewrite_pdrs(&self, msg: &mut PFCPMessage, pdr_types: &[u16], ue_ip: Ipv4Addr) -> Result<()> {
		for ie in msg.ies.iter_mut() {
			if !pdr_types.contains(&ie.ie_type) {
				continue;
			}
			if let Some(rebuilt) = self.rewrite_pdr(ie, ue_ip)? {
				*ie = rebuilt;
			}
		}
		Ok(())
	}

	/// `None` when the PDR has no UE IP Address to rewrite
	pub fn rewrite_pdr(&self, pdr: &IE, ue_ip: Ipv4Addr) -> Result<Option<IE>> {
		let mut children = pdr.children().map_err(|e| malformed("PDR", e))?;
		let mut modified = false;
		for child in children.iter_mut() {
			if child.ie_type != IE_PDI {
				continue;
			}
			if let Some(pdi) = self.rewrite_pdi(child, ue_ip)? {
				*child = pdi;
				modified = true;
			}
		}
		if !modified {
			return Ok(None);
		}
		IE::grouped(pdr.ie_type, &children).map(Some).map_err(|e| malformed("PDR", e))
	}

	fn rewrite_pdi(&self, pdi: &IE, ue_ip: Ipv4Addr) -> Result<Option<IE>> {
		let mut children = pdi.children().map_err(|e| malformed("PDI", e))?;
		let mut modified = false;
		for child in children.iter_mut() {
			if child.ie_type != UE_IPAddress::ID {
				continue;
			}
			if let Some(ue) = self.rewrite_ue_ip(child, ue_ip)? {
				*child = ue;
				modified = true;
			}
		}
		if !modified {
			return Ok(None);
		}
		IE::grouped(pdi.ie_type, &children).map(Some).map_err(|e| malformed("PDI", e))
	}

	/// `None` when the policy leaves the IE alone (IPv6-only address without stripping)
	pub fn rewrite_ue_ip(&self, original: &IE, ue_ip: Ipv4Addr) -> Result<Option<IE>> {
		let mut ue = original.parse::<UE_IPAddress>().map_err(|e| malformed("UE IP Address", e))?;
		if self.strip_ipv6 {
			ue.flags.0 = (ue.flags.0 & !(UE_IP_V6 | UE_IP_IPV6D | UE_IP_IP6PL)) | UE_IP_V4;
			ue.ipv4 = Some(ue_ip);
			ue.ipv6 = None;
			ue.ipv6_prefix_delegation_bits = None;
			ue.ipv6_prefix_length = None;
			return Ok(Some(IE::from_model(&ue)));
		}
		if ue.flags.0 & UE_IP_V4 == 0 {
			return Ok(None);
		}
		ue.ipv4 = Some(ue_ip);
		Ok(Some(IE::from_model(&ue)))
	}
}

fn malformed(field: &'static str, e: libpfcp::PFCPError) -> ReplayError {
	ReplayError::MalformedRewrite {
		field,
		reason: e.to_string(),
	}
}

/// CP SEID of the recorded establishment request, the join key for later messages
pub fn original_local_seid(msg: &PFCPMessage) -> Result<u64> {
	match msg.f_seid() {
		Ok(Some(f_seid)) => Ok(f_seid.seid),
		Ok(None) => Err(ReplayError::FieldAbsent {
			field: "CP F-SEID",
			message: "SessionEstablishmentRequest",
		}),
		Err(e) => Err(malformed("CP F-SEID", e)),
	}
}
