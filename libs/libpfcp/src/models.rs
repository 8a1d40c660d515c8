#![allow(non_snake_case, non_camel_case_types)]

use std::{
    convert::TryInto,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use bitfield::bitfield;

use super::{PFCPError, PFCPModel};

macro_rules! decode_primitive_u8 {
    ($t:ident, $u:expr) => {
        match num_traits::FromPrimitive::from_u8($u) as Option<$t> {
            Some(a) => a,
            None => {
                return Err(PFCPError::new(&format!(
                    "FromPrimitive error {} from {}",
                    stringify!($t),
                    $u
                )));
            }
        }
    };
}

macro_rules! ensure_length {
    ($stream:expr, $n:expr, $what:expr) => {
        if $stream.len() < $n {
            return Err(PFCPError::new(&format!(
                "insufficient length for {}: need {}, got {}",
                $what,
                $n,
                $stream.len()
            )));
        }
    };
}

pub const PFCP_VERSION: u8 = 1;

bitfield! {
    #[derive(Clone, Debug, PartialEq)]
    pub struct PFCPHeaderFlags(u8);
    u8;
    pub getVersion, setVersion: 7, 5;
    pub getFO, setFO: 2, 2; // Follow On
    pub getMP, setMP: 1, 1; // Presence of Message Priority
    pub getSEID, setSEID: 0, 0;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PFCPHeader {
    pub flags: PFCPHeaderFlags,
    pub msg_type: u8,
    /// Octets following the first 4 header octets
    pub length: u16,
    pub seid: Option<u64>,
    /// Sequence number, big endian, lower 24 bits are used
    pub seq: u32,
    pub priority: Option<u8>,
}

impl PFCPHeader {
    pub fn new(msg_type: u8, seid: Option<u64>, seq: u32) -> PFCPHeader {
        let mut flags = PFCPHeaderFlags(0);
        flags.setVersion(PFCP_VERSION);
        flags.setSEID(seid.is_some() as u8);
        PFCPHeader {
            flags,
            msg_type,
            length: 0,
            seid,
            seq: seq & 0x00_ff_ff_ff,
            priority: None,
        }
    }
    /// Size of the header on the wire
    pub fn encoded_len(&self) -> usize {
        if self.seid.is_some() {
            16
        } else {
            8
        }
    }
    pub fn set_seid(&mut self, seid: u64) {
        self.seid = Some(seid);
        self.flags.setSEID(1);
    }
    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq & 0x00_ff_ff_ff;
    }
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = self.flags.clone();
        flags.setSEID(self.seid.is_some() as u8);
        flags.setMP(self.priority.is_some() as u8);
        let mut ret = vec![flags.0, self.msg_type];
        ret.extend_from_slice(&self.length.to_be_bytes());
        if let Some(seid) = self.seid {
            ret.extend_from_slice(&seid.to_be_bytes());
        }
        let seq_priority = ((self.seq & 0x00_ff_ff_ff) << 8)
            | ((self.priority.map_or(0, |f| (f & 0x0f) << 4)) as u32);
        ret.extend_from_slice(&seq_priority.to_be_bytes());
        ret
    }
    /// Returns (body, remaining octets after this message, header)
    pub fn decode(stream: &[u8]) -> Result<(Vec<u8>, &[u8], PFCPHeader), PFCPError> {
        let mut stream = stream;
        if stream.len() < 4 {
            return Err(PFCPError::new(&format!(
                "Expect at 4 octets for PFCP header, got {}",
                stream.len()
            )));
        }
        let flags = PFCPHeaderFlags(stream[0]);
        if flags.getVersion() != PFCP_VERSION {
            return Err(PFCPError::new(&format!(
                "Unsupported PFCP version {}",
                flags.getVersion()
            )));
        }
        let msg_type = stream[1];
        let length = u16::from_be_bytes([stream[2], stream[3]]);
        stream = &stream[4..];
        if stream.len() < length as usize {
            return Err(PFCPError::new(&format!(
                "Message is of length {}, but remaining octects is {}",
                length,
                stream.len()
            )));
        }
        let mandatory = if flags.getSEID() != 0 { 12 } else { 4 };
        if (length as usize) < mandatory {
            return Err(PFCPError::new(&format!(
                "Message length {} is shorter than mandatory header fields",
                length
            )));
        }
        let mut body_length = length as usize;
        let seid = if flags.getSEID() != 0 {
            let r = u64::from_be_bytes(stream[0..8].try_into().unwrap());
            stream = &stream[8..];
            body_length -= 8;
            Some(r)
        } else {
            None
        };
        let seq_priority = u32::from_be_bytes(stream[0..4].try_into().unwrap());
        stream = &stream[4..];
        body_length -= 4;
        let priority = if flags.getMP() != 0 {
            Some(((seq_priority & 0xF0) as u8) >> 4)
        } else {
            None
        };
        Ok((
            stream[..body_length].to_vec(),
            &stream[body_length..],
            PFCPHeader {
                flags,
                msg_type,
                length,
                seid,
                seq: seq_priority >> 8,
                priority,
            },
        ))
    }
    /// Is this message a request or a response to a request
    pub fn is_request(&self) -> bool {
        match self.msg_type {
            1 | 3 | 5 | 7 | 9 | 12 | 14 | 50 | 52 | 54 | 56 => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MsgType {
    HeartbeatRequest = 1,
    HeartbeatResponse = 2,
    PFDManagementRequest = 3,
    PFDManagementResponse = 4,
    AssociationSetupRequest = 5,
    AssociationSetupResponse = 6,
    AssociationUpdateRequest = 7,
    AssociationUpdateResponse = 8,
    AssociationReleaseRequest = 9,
    AssociationReleaseResponse = 10,
    VersionNotSupportedResponse = 11,
    NodeReportRequest = 12,
    NodeReportResponse = 13,
    SessionSetDeletionRequest = 14,
    SessionSetDeletionResponse = 15,
    SessionEstablishmentRequest = 50,
    SessionEstablishmentResponse = 51,
    SessionModificationRequest = 52,
    SessionModificationResponse = 53,
    SessionDeletionRequest = 54,
    SessionDeletionResponse = 55,
    SessionReportRequest = 56,
    SessionReportResponse = 57,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<MsgType> {
        num_traits::FromPrimitive::from_u8(v)
    }
    pub fn name(&self) -> &'static str {
        match self {
            MsgType::HeartbeatRequest => "HeartbeatRequest",
            MsgType::HeartbeatResponse => "HeartbeatResponse",
            MsgType::PFDManagementRequest => "PFDManagementRequest",
            MsgType::PFDManagementResponse => "PFDManagementResponse",
            MsgType::AssociationSetupRequest => "AssociationSetupRequest",
            MsgType::AssociationSetupResponse => "AssociationSetupResponse",
            MsgType::AssociationUpdateRequest => "AssociationUpdateRequest",
            MsgType::AssociationUpdateResponse => "AssociationUpdateResponse",
            MsgType::AssociationReleaseRequest => "AssociationReleaseRequest",
            MsgType::AssociationReleaseResponse => "AssociationReleaseResponse",
            MsgType::VersionNotSupportedResponse => "VersionNotSupportedResponse",
            MsgType::NodeReportRequest => "NodeReportRequest",
            MsgType::NodeReportResponse => "NodeReportResponse",
            MsgType::SessionSetDeletionRequest => "SessionSetDeletionRequest",
            MsgType::SessionSetDeletionResponse => "SessionSetDeletionResponse",
            MsgType::SessionEstablishmentRequest => "SessionEstablishmentRequest",
            MsgType::SessionEstablishmentResponse => "SessionEstablishmentResponse",
            MsgType::SessionModificationRequest => "SessionModificationRequest",
            MsgType::SessionModificationResponse => "SessionModificationResponse",
            MsgType::SessionDeletionRequest => "SessionDeletionRequest",
            MsgType::SessionDeletionResponse => "SessionDeletionResponse",
            MsgType::SessionReportRequest => "SessionReportRequest",
            MsgType::SessionReportResponse => "SessionReportResponse",
        }
    }
}

pub fn message_type_name(msg_type: u8) -> &'static str {
    MsgType::from_u8(msg_type).map_or("Unknown", |t| t.name())
}

// Grouped IE types walked by the session rewriter
pub const IE_CREATE_PDR: u16 = 1;
pub const IE_PDI: u16 = 2;
pub const IE_UPDATE_PDR: u16 = 9;
pub const IE_F_TEID: u16 = 21;

#[test]
pub fn test_pfcp_header() {
    let msg = PFCPHeader {
        flags: PFCPHeaderFlags(0b00100001),
        msg_type: 123,
        length: 32 as u16,
        seid: Some(123456),
        seq: 1,
        priority: None,
    };
    let mut encoded = msg.encode();
    encoded.append(&mut vec![123u8; 20]);
    let decoded = PFCPHeader::decode(&encoded).unwrap().2;
    assert_eq!(msg, decoded);
}

#[test]
pub fn test_pfcp_header_priority_and_short_length() {
    let mut msg = PFCPHeader::new(52, Some(7), 0x00ab_cdef);
    msg.priority = Some(5);
    msg.length = 12;
    let encoded = msg.encode();
    assert_eq!(encoded[0], 0b0010_0011);
    assert_eq!(&encoded[12..16], &[0xab, 0xcd, 0xef, 0x50]);
    let (body, rest, decoded) = PFCPHeader::decode(&encoded).unwrap();
    assert!(body.is_empty());
    assert!(rest.is_empty());
    assert_eq!(decoded.priority, Some(5));
    assert_eq!(decoded.seq, 0x00ab_cdef);

    // length says 12 but the S flag is clear, then a truncated buffer
    assert!(PFCPHeader::decode(&[0x20, 1, 0, 2, 0, 0]).is_err());
    assert!(PFCPHeader::decode(&[0x20, 1, 0, 12, 0, 0, 0, 1]).is_err());
    // version 2
    assert!(PFCPHeader::decode(&[0x40, 1, 0, 4, 0, 0, 1, 0]).is_err());
}

#[test]
pub fn test_set_seq_masks_to_24_bits() {
    let mut h = PFCPHeader::new(1, None, 0);
    h.set_seq(0x0100_0002);
    assert_eq!(h.seq, 2);
    h.set_seid(99);
    assert_eq!(h.flags.getSEID(), 1);
    assert_eq!(h.encoded_len(), 16);
}

#[derive(Debug, Clone, Copy, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum NodeIdType {
    IPV4 = 0,
    IPV6 = 1,
    FQDN = 2,
}
#[derive(Debug, Clone, PartialEq)]
pub struct NodeID {
    /// Node ID Type
    pub node_id_type: NodeIdType,

    /// Node ID Value
    pub node_id: Vec<u8>,
    // FQDN encoding shall be identical to the encoding of a FQDN within a DNS message of clause 3.1 of
    //   IETF RFC 1035 [27] but excluding the trailing zero byte.
}
impl NodeID {
    pub fn from_ip(ip: IpAddr) -> NodeID {
        match ip {
            IpAddr::V4(v4) => NodeID {
                node_id_type: NodeIdType::IPV4,
                node_id: v4.octets().to_vec(),
            },
            IpAddr::V6(v6) => NodeID {
                node_id_type: NodeIdType::IPV6,
                node_id: v6.octets().to_vec(),
            },
        }
    }
    /// `None` for FQDN node IDs
    pub fn to_ip(&self) -> Option<IpAddr> {
        match self.node_id_type {
            NodeIdType::IPV4 => {
                let tmp: [u8; 4] = self.node_id.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(tmp)))
            }
            NodeIdType::IPV6 => {
                let tmp: [u8; 16] = self.node_id.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(tmp)))
            }
            NodeIdType::FQDN => None,
        }
    }
}
impl PFCPModel for NodeID {
    const ID: u16 = 60;
    fn encode(&self) -> Vec<u8> {
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&((self.node_id.len() + 1) as u16).to_be_bytes());
        result.push(self.node_id_type as u8);
        result.extend_from_slice(&self.node_id);
        result
    }
    fn decode(stream: &[u8]) -> Result<NodeID, PFCPError> {
        ensure_length!(stream, 1, "Node ID");
        let id_type = decode_primitive_u8!(NodeIdType, stream[0] & 0x0f);
        let stream = &stream[1..];
        let length = stream.len();
        match id_type {
            NodeIdType::IPV4 => {
                if length != 4 {
                    return Err(PFCPError::new(&format!("Expect length 4, got {}", length)));
                }
            }
            NodeIdType::IPV6 => {
                if length != 16 {
                    return Err(PFCPError::new(&format!("Expect length 16, got {}", length)));
                }
            }
            NodeIdType::FQDN => {}
        };
        Ok(NodeID {
            node_id_type: id_type,
            node_id: stream.to_vec(),
        })
    }
}

/// Seconds between 1900-01-01 and the unix epoch
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryTimeStamp {
    pub timestamp: u32,
}
impl RecoveryTimeStamp {
    pub fn new(startup_time: chrono::DateTime<chrono::offset::Utc>) -> RecoveryTimeStamp {
        let diff = startup_time.timestamp() + NTP_UNIX_OFFSET;
        RecoveryTimeStamp { timestamp: diff as u32 }
    }
}
impl PFCPModel for RecoveryTimeStamp {
    const ID: u16 = 96;

    fn encode(&self) -> Vec<u8> {
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&4u16.to_be_bytes());
        result.extend_from_slice(&self.timestamp.to_be_bytes());
        result
    }
    fn decode(stream: &[u8]) -> Result<RecoveryTimeStamp, PFCPError> {
        let length = stream.len();
        if length != 4 {
            return Err(PFCPError::new(&format!("Expect length 4, got {}", length)));
        }
        let timestamp = u32::from_be_bytes(stream[..4].try_into().unwrap());
        Ok(RecoveryTimeStamp { timestamp })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Cause {
    Reserved = 0,
    RequestAccepted = 1,
    MoreUsageReportToSend = 2,
    RequestRejectedUnspecified = 64,
    SessionContextNotFound = 65,
    MandatoryIEMissing = 66,
    ConditionalIEMissing = 67,
    InvalidLength = 68,
    MandatoryIEIncorrect = 69,
    InvalidForwardingPolicy = 70,
    InvalidFTEIDAllocationOption = 71,
    NoEstablishedPFCPAssociation = 72,
    RuleCreationModificationFailure = 73,
    PFCPEntityInCongestion = 74,
    NoResourcesAvailable = 75,
    ServiceNotSupported = 76,
    SystemFailure = 77,
    RedirectionRequested = 78,
}
impl Cause {
    pub fn from_u8(v: u8) -> Option<Cause> {
        num_traits::FromPrimitive::from_u8(v)
    }
    pub fn is_accepted(&self) -> bool {
        matches!(self, Cause::RequestAccepted | Cause::MoreUsageReportToSend)
    }
}
impl PFCPModel for Cause {
    const ID: u16 = 19;

    fn encode(&self) -> Vec<u8> {
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&1u16.to_be_bytes());
        result.push(*self as u8);
        result
    }

    fn decode(stream: &[u8]) -> Result<Self, PFCPError>
    where
        Self: Sized,
    {
        let length = stream.len();
        if length != 1 {
            return Err(PFCPError::new(&format!("Expect length 1, got {}", length)));
        }
        Ok(decode_primitive_u8!(Self, stream[0]))
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct F_SEID {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub seid: u64,
}
impl F_SEID {
    pub fn new(ip: IpAddr, seid: u64) -> F_SEID {
        match ip {
            IpAddr::V4(v4) => F_SEID {
                ipv4: Some(v4),
                ipv6: None,
                seid,
            },
            IpAddr::V6(v6) => F_SEID {
                ipv4: None,
                ipv6: Some(v6),
                seid,
            },
        }
    }
}
impl PFCPModel for F_SEID {
    const ID: u16 = 57;

    fn encode(&self) -> Vec<u8> {
        let mut flag = 0u8;
        let mut length: u16 = 1 + 8;
        if self.ipv4.is_some() {
            flag |= 0b10;
            length += 4;
        };
        if self.ipv6.is_some() {
            flag |= 0b01;
            length += 16;
        };
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&length.to_be_bytes());
        result.push(flag);
        result.extend_from_slice(&self.seid.to_be_bytes());
        if let Some(ip) = self.ipv4 {
            result.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.ipv6 {
            result.extend_from_slice(&ip.octets());
        }
        result
    }

    fn decode(stream: &[u8]) -> Result<Self, PFCPError>
    where
        Self: Sized,
    {
        let mut stream = stream;
        ensure_length!(stream, 9, "F-SEID");
        let flag = stream[0];
        stream = &stream[1..];
        let seid = u64::from_be_bytes(stream[..8].try_into().unwrap());
        stream = &stream[8..];
        let v4 = if flag & 0b10 != 0 {
            ensure_length!(stream, 4, "F-SEID IPv4 address");
            let tmp: [u8; 4] = stream[..4].try_into().unwrap();
            stream = &stream[4..];
            Some(Ipv4Addr::from(tmp))
        } else {
            None
        };
        let v6 = if flag & 0b01 != 0 {
            ensure_length!(stream, 16, "F-SEID IPv6 address");
            let tmp: [u8; 16] = stream[..16].try_into().unwrap();
            Some(Ipv6Addr::from(tmp))
        } else {
            None
        };
        Ok(F_SEID {
            ipv4: v4,
            ipv6: v6,
            seid,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Copy)]
pub struct PDR_ID {
    pub rule_id: u16,
}
impl PFCPModel for PDR_ID {
    const ID: u16 = 56;

    fn encode(&self) -> Vec<u8> {
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&2u16.to_be_bytes());
        result.extend_from_slice(&self.rule_id.to_be_bytes());
        result
    }

    fn decode(stream: &[u8]) -> Result<Self, PFCPError>
    where
        Self: Sized,
    {
        ensure_length!(stream, 2, "PDR ID");
        Ok(PDR_ID {
            rule_id: u16::from_be_bytes([stream[0], stream[1]]),
        })
    }
}

bitfield! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct UE_IPAddressFlags(u8);
    u8;
    pub getV6, setV6: 0, 0;
    pub getV4, setV4: 1, 1;
    /// 0 for Source, 1 for Destination
    pub getSD, setSD: 2, 2;
    pub getIPv6D, setIPv6D: 3, 3;
    pub getCHV4, setCHV4: 4, 4;
    pub getCHV6, setCHV6: 5, 5;
    pub getIP6PL, setIP6PL: 6, 6;
}
#[derive(Debug, Clone, PartialEq)]
pub struct UE_IPAddress {
    pub flags: UE_IPAddressFlags,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub ipv6_prefix_delegation_bits: Option<u8>,
    pub ipv6_prefix_length: Option<u8>,
}
impl UE_IPAddress {
    pub fn new() -> UE_IPAddress {
        UE_IPAddress {
            flags: UE_IPAddressFlags(0),
            ipv4: None,
            ipv6: None,
            ipv6_prefix_delegation_bits: None,
            ipv6_prefix_length: None,
        }
    }
}
impl PFCPModel for UE_IPAddress {
    const ID: u16 = 93;

    fn encode(&self) -> Vec<u8> {
        let mut length: u16 = 1;
        if self.ipv4.is_some() {
            length += 4;
        }
        if self.ipv6.is_some() {
            length += 16;
        }
        if self.ipv6_prefix_delegation_bits.is_some() {
            length += 1;
        }
        if self.ipv6_prefix_length.is_some() {
            length += 1;
        }
        let mut result = Self::ID.to_be_bytes().to_vec();
        result.extend_from_slice(&length.to_be_bytes());
        result.push(self.flags.0);
        if let Some(ip) = self.ipv4 {
            result.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.ipv6 {
            result.extend_from_slice(&ip.octets());
        }
        if let Some(bits) = self.ipv6_prefix_delegation_bits {
            result.push(bits);
        }
        if let Some(len) = self.ipv6_prefix_length {
            result.push(len);
        }
        result
    }

    fn decode(stream: &[u8]) -> Result<Self, PFCPError>
    where
        Self: Sized,
    {
        let mut stream = stream;
        ensure_length!(stream, 1, "UE IP Address");
        let flags = UE_IPAddressFlags(stream[0]);
        stream = &stream[1..];
        let ipv4 = if flags.getV4() != 0 {
            ensure_length!(stream, 4, "UE IP Address IPv4");
            let tmp: [u8; 4] = stream[..4].try_into().unwrap();
            stream = &stream[4..];
            Some(Ipv4Addr::from(tmp))
        } else {
            None
        };
        let ipv6 = if flags.getV6() != 0 {
            ensure_length!(stream, 16, "UE IP Address IPv6");
            let tmp: [u8; 16] = stream[..16].try_into().unwrap();
            stream = &stream[16..];
            Some(Ipv6Addr::from(tmp))
        } else {
            None
        };
        let v6d = if flags.getIPv6D() != 0 {
            ensure_length!(stream, 1, "UE IP Address prefix delegation bits");
            let tmp = stream[0];
            stream = &stream[1..];
            Some(tmp)
        } else {
            None
        };
        let v6pl = if flags.getIP6PL() != 0 {
            ensure_length!(stream, 1, "UE IP Address prefix length");
            Some(stream[0])
        } else {
            None
        };
        Ok(Self {
            flags,
            ipv4,
            ipv6,
            ipv6_prefix_delegation_bits: v6d,
            ipv6_prefix_length: v6pl,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ue_ip_dual_stack() {
        let mut ue = UE_IPAddress::new();
        ue.flags = UE_IPAddressFlags(0x02 | 0x01 | 0x04 | 0x40);
        ue.ipv4 = Some(Ipv4Addr::new(10, 45, 0, 9));
        ue.ipv6 = Some("2001:db8::1".parse().unwrap());
        ue.ipv6_prefix_length = Some(64);
        let encoded = ue.encode();
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 1 + 4 + 16 + 1);
        let decoded = UE_IPAddress::decode(&encoded[4..]).unwrap();
        assert_eq!(decoded, ue);
        assert_eq!(decoded.flags.getSD(), 1);
    }

    #[test]
    fn test_ue_ip_truncated() {
        // V4 flag set but only two octets of address
        assert!(UE_IPAddress::decode(&[0x02, 10, 45]).is_err());
        assert!(UE_IPAddress::decode(&[]).is_err());
    }

    #[test]
    fn test_f_seid() {
        let fseid = F_SEID::new("10.0.0.1".parse().unwrap(), 0x1122334455667788);
        let encoded = fseid.encode();
        assert_eq!(encoded[4], 0b10);
        assert_eq!(F_SEID::decode(&encoded[4..]).unwrap(), fseid);
        assert!(F_SEID::decode(&encoded[4..10]).is_err());
        // v4 flag but address missing
        assert!(F_SEID::decode(&encoded[4..13]).is_err());
    }

    #[test]
    fn test_node_id_and_cause() {
        let node = NodeID::from_ip("192.168.1.1".parse().unwrap());
        let encoded = node.encode();
        let decoded = NodeID::decode(&encoded[4..]).unwrap();
        assert_eq!(decoded.to_ip(), Some("192.168.1.1".parse().unwrap()));
        assert!(NodeID::decode(&[0, 1, 2]).is_err());

        assert_eq!(Cause::decode(&[1]).unwrap(), Cause::RequestAccepted);
        assert!(Cause::decode(&[1]).unwrap().is_accepted());
        assert!(!Cause::decode(&[65]).unwrap().is_accepted());
        assert!(Cause::decode(&[200]).is_err());
    }

    #[test]
    fn test_recovery_timestamp_epoch() {
        let unix_epoch = chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap();
        assert_eq!(RecoveryTimeStamp::new(unix_epoch).timestamp, 2_208_988_800);
    }

    #[test]
    fn test_message_type_name() {
        assert_eq!(message_type_name(50), "SessionEstablishmentRequest");
        assert_eq!(message_type_name(200), "Unknown");
    }
}
