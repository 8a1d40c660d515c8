use crate::{messages::IE, PFCPError};

/// IE type bit marking a vendor specific IE carrying an enterprise ID
pub const ENTERPRISE_BIT: u16 = 0x8000;

/// Walk a TLV sequence into raw IEs, keeping every value octet as received.
pub fn decode_ies(stream: &[u8]) -> Result<Vec<IE>, PFCPError> {
    let mut stream = stream;
    let mut ret = Vec::new();
    while !stream.is_empty() {
        if stream.len() < 4 {
            return Err(PFCPError::new(&format!(
                "Trailing {} octets cannot hold an IE header",
                stream.len()
            )));
        }
        let ie_type = u16::from_be_bytes([stream[0], stream[1]]);
        let length = u16::from_be_bytes([stream[2], stream[3]]) as usize;
        stream = &stream[4..];
        if stream.len() < length {
            return Err(PFCPError::new(&format!(
                "IE type {} is of length {}, but remaining octects is {}",
                ie_type,
                length,
                stream.len()
            )));
        }
        if ie_type & ENTERPRISE_BIT != 0 && length < 2 {
            return Err(PFCPError::new(&format!(
                "Vendor specific IE type {} is missing its enterprise ID",
                ie_type
            )));
        }
        ret.push(IE::new(ie_type, stream[..length].to_vec()));
        stream = &stream[length..];
    }
    Ok(ret)
}

pub fn encode_ies(ies: &[IE]) -> Vec<u8> {
    let mut ret = Vec::with_capacity(ies.iter().map(|ie| ie.encoded_len()).sum());
    for ie in ies {
        ie.encode_into(&mut ret);
    }
    ret
}
