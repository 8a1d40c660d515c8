use std::{fmt, net::Ipv4Addr};

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod ip_pool;
pub mod manager;
pub mod seid_allocator;

pub use ip_pool::IpPool;
pub use manager::{ManagerOptions, SessionManager};
pub use seid_allocator::{SeidAllocator, SeidStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Establishing,
	Established,
	Modifying,
	Deleting,
	Deleted,
	Failed,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let s = match self {
			SessionState::Establishing => "establishing",
			SessionState::Established => "established",
			SessionState::Modifying => "modifying",
			SessionState::Deleting => "deleting",
			SessionState::Deleted => "deleted",
			SessionState::Failed => "failed",
		};
		write!(f, "{}", s)
	}
}

/// One replayed session and the three SEID spaces it spans
#[derive(Debug, Clone)]
pub struct SessionInfo {
	/// CP SEID from the recording's establishment request
	pub original_local_seid: u64,
	/// UP SEID the recorded peer assigned, 0 if the recording holds no response
	pub original_remote_seid: u64,
	/// CP SEID sent to the live peer
	pub local_seid: u64,
	/// UP SEID assigned by the live peer, 0 until established
	pub remote_seid: u64,
	pub ue_ip: Ipv4Addr,
	pub state: SessionState,
	pub created_at: DateTime<Utc>,
}

impl SessionInfo {
	pub fn new(original_local_seid: u64, local_seid: u64, ue_ip: Ipv4Addr) -> SessionInfo {
		SessionInfo {
			original_local_seid,
			original_remote_seid: 0,
			local_seid,
			remote_seid: 0,
			ue_ip,
			state: SessionState::Establishing,
			created_at: Utc::now(),
		}
	}
}

/// Original CP SEID to original UP SEID, mined from recorded establishment responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeidMapping {
	pub original_local_seid: u64,
	pub original_remote_seid: u64,
}
