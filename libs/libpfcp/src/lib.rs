
#[macro_use]
extern crate num_derive;

use std::error::Error;
use std::fmt;

/// A typed information element.
/// `encode` produces the full TLV, `decode` consumes the value part only.
pub trait PFCPModel {
	const ID: u16;
	fn encode(&self) -> Vec<u8>;
	fn decode(stream: &[u8]) -> Result<Self, PFCPError> where Self: Sized;
}

pub mod models;
pub mod messages;
pub mod handlers;
pub mod helpers;

pub use messages::{PFCPMessage, IE};
pub use models::{MsgType, PFCPHeader};

/// Well known PFCP UDP port
pub const PFCP_PORT: u16 = 8805;

#[derive(Debug, Clone, PartialEq)]
pub struct PFCPError {
	details: String,
}

impl PFCPError {
	pub fn new(msg: &str) -> PFCPError {
		PFCPError {
			details: msg.to_string(),
		}
	}
	pub fn details(&self) -> &str {
		&self.details
	}
}

impl fmt::Display for PFCPError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.details)
	}
}

impl Error for PFCPError {}
