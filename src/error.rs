use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
	#[error("SEID space exhausted after {attempts} attempts")]
	AllocationExhausted { attempts: u64 },

	#[error("UE IP pool {cidr} exhausted")]
	PoolExhausted { cidr: String },

	#[error("{field} absent in {message}")]
	FieldAbsent { field: &'static str, message: &'static str },

	#[error("cannot rewrite {field}: {reason}")]
	MalformedRewrite { field: &'static str, reason: String },

	#[error("no session found for SEID {seid:#x}")]
	UnresolvedSession { seid: u64 },

	#[error("transport failure: {0}")]
	Transport(String),

	#[error("timeout after {retries} retries")]
	Timeout { retries: u32 },

	#[error("cancelled")]
	Cancelled,

	#[error("decode error: {0}")]
	Decode(#[from] libpfcp::PFCPError),

	#[error("{message} rejected with cause {cause}")]
	Rejected { message: &'static str, cause: u8 },

	#[error("association setup failed: {0}")]
	AssociationFailed(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("pcap: {0}")]
	Pcap(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl ReplayError {
	/// Errors that stop the replay loop instead of failing a single message
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			ReplayError::Transport(_) | ReplayError::AssociationFailed(_) | ReplayError::Cancelled
		)
	}

	pub fn pool_exhausted(network: Ipv4Addr, prefix: u8) -> ReplayError {
		ReplayError::PoolExhausted {
			cidr: format!("{}/{}", network, prefix),
		}
	}
}

pub type Result<T> = std::result::Result<T, ReplayError>;
